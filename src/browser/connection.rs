use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::error::{AppError, AppResult};

/// 连接到已开启调试端口的浏览器并获取页面
///
/// 复用浏览器里已有的登录状态；`start_url` 为空时打开空白页
pub async fn connect_to_browser_and_page(
    port: u16,
    start_url: Option<&str>,
) -> AppResult<(Browser, Page)> {
    let browser_url = format!("http://localhost:{}", port);
    info!("正在连接到浏览器: {}", browser_url);

    let (browser, mut handler) = Browser::connect(&browser_url).await.map_err(|e| {
        error!("连接浏览器失败: {}", e);
        AppError::browser_connection_failed(port, e)
    })?;
    debug!("浏览器连接成功");

    // 在后台处理浏览器事件
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 添加短暂延迟以等待浏览器状态同步
    sleep(tokio::time::Duration::from_millis(300)).await;

    let url = start_url.filter(|u| !u.is_empty()).unwrap_or("about:blank");
    debug!("创建新页面并导航到: {}", url);
    let page = browser
        .new_page(url)
        .await
        .map_err(|e| AppError::browser_connection_failed(port, e))?;
    info!("✓ 页面已就绪: {}", url);

    Ok((browser, page))
}
