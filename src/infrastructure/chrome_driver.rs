//! Chrome 表单驱动 - 基础设施层
//!
//! 通过 JsExecutor 在页面里执行脚本实现 FormDriver。
//! 每个扫描到的控件都会被打上 `data-aa-id` 属性，后续操作按这个属性定位

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::BrowserError;
use crate::infrastructure::form_driver::{ActionControl, FormDriver};
use crate::infrastructure::js_executor::JsExecutor;
use crate::models::{FieldDescriptor, FieldKind};

/// 目标已关闭的页面提示
const CLOSED_INDICATORS: &[&str] = &[
    "no longer accepting applications",
    "ya no se aceptan solicitudes",
    "this job is no longer available",
    "este trabajo ya no está disponible",
    "this position has been filled",
];

/// URL 中出现即视为站点拦截
const BLOCKED_URL_MARKERS: &[&str] = &["checkpoint", "challenge", "captcha", "authwall"];

/// 申请入口按钮
const APPLY_ENTRY_SELECTORS: &[&str] = &[
    "button.jobs-apply-button",
    "button[aria-label*='Easy Apply']",
    "button[aria-label*='Solicitud sencilla']",
    "a[aria-label*='Easy Apply']",
    "a[aria-label*='Solicitud sencilla']",
    "a.jobs-apply-button",
];

/// 动作按钮关键词（提交类在前）
const ACTION_KEYWORDS: &[&str] = &[
    "submit",
    "send",
    "enviar",
    "apply",
    "review",
    "revisar",
    "next",
    "continue",
    "continuar",
    "siguiente",
];

/// 页面变化后等待渲染的时间
const SETTLE_DELAY: Duration = Duration::from_millis(1500);

/// 脚本里定位表单根节点：优先弹窗，其次 form，最后整个页面
const ROOT_JS: &str = r#"(document.querySelector('[role="dialog"]') || document.querySelector('form') || document.body)"#;

#[derive(Debug, Deserialize)]
struct ScriptOutcome {
    ok: bool,
    #[serde(default)]
    reason: String,
}

/// Chrome 表单驱动
pub struct ChromeFormDriver {
    executor: JsExecutor,
}

impl ChromeFormDriver {
    pub fn new(executor: JsExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &JsExecutor {
        &self.executor
    }

    async fn run_action(&self, operation: &str, js_code: String) -> Result<(), BrowserError> {
        let outcome: ScriptOutcome = self.executor.eval_as(js_code).await?;
        if outcome.ok {
            Ok(())
        } else {
            Err(BrowserError::UnexpectedPayload {
                operation: operation.to_string(),
                reason: outcome.reason,
            })
        }
    }

    async fn upload_file(&self, field: &FieldDescriptor, path: &str) -> Result<(), BrowserError> {
        let absolute = tokio::fs::canonicalize(path)
            .await
            .map_err(|e| BrowserError::UnexpectedPayload {
                operation: "upload_file".to_string(),
                reason: format!("{}: {}", path, e),
            })?;

        let element = self
            .executor
            .page()
            .find_element(format!("[data-aa-id=\"{}\"]", field.control_id))
            .await?;

        let mut params =
            SetFileInputFilesParams::new(vec![absolute.to_string_lossy().to_string()]);
        params.backend_node_id = Some(element.backend_node_id);
        self.executor.page().execute(params).await?;

        debug!("已上传附件: {}", absolute.display());
        Ok(())
    }
}

#[async_trait]
impl FormDriver for ChromeFormDriver {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.executor.goto(url).await?;
        sleep(SETTLE_DELAY).await;
        Ok(())
    }

    async fn is_target_unavailable(&self) -> Result<bool, BrowserError> {
        let text: String = self
            .executor
            .eval_as("(() => (document.body ? document.body.innerText : '').toLowerCase())()")
            .await?;
        Ok(CLOSED_INDICATORS.iter().any(|indicator| text.contains(indicator)))
    }

    async fn is_hard_blocked(&self) -> Result<bool, BrowserError> {
        let url = self.executor.current_url().await?.to_lowercase();
        if BLOCKED_URL_MARKERS.iter().any(|marker| url.contains(marker)) {
            warn!("检测到拦截页面: {}", url);
            return Ok(true);
        }

        let has_captcha: bool = self
            .executor
            .eval_as(
                r#"(() => !!document.querySelector('iframe[src*="captcha"], iframe[title*="challenge"], #captcha-internal'))()"#,
            )
            .await?;
        Ok(has_captcha)
    }

    async fn open_form(&self) -> Result<bool, BrowserError> {
        let selectors = serde_json::to_string(APPLY_ENTRY_SELECTORS).unwrap_or_else(|_| "[]".into());
        let js_code = format!(
            r#"
            (() => {{
                const dialog = document.querySelector('[role="dialog"]');
                if (dialog && dialog.querySelector('input, select, textarea')) {{
                    return "open";
                }}
                for (const selector of {selectors}) {{
                    const button = document.querySelector(selector);
                    if (button) {{
                        button.click();
                        return "clicked";
                    }}
                }}
                const form = document.querySelector('form');
                if (form && form.querySelector('input, select, textarea')) {{
                    return "open";
                }}
                return "none";
            }})()
            "#
        );

        let state: String = self.executor.eval_as(js_code).await?;
        debug!("申请入口: {}", state);
        match state.as_str() {
            "open" => Ok(true),
            "clicked" => {
                sleep(SETTLE_DELAY).await;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_controls(&self) -> Result<Vec<FieldDescriptor>, BrowserError> {
        let js_code = format!(
            r#"
            (() => {{
                const root = {ROOT_JS};
                let counter = Number(document.body.dataset.aaCounter || 0);
                const tag = (el) => {{
                    if (!el.dataset.aaId) {{
                        counter += 1;
                        el.dataset.aaId = 'aa-' + counter;
                    }}
                    return el.dataset.aaId;
                }};
                const text = (el) => (el ? (el.innerText || el.textContent || '') : '').trim();
                const labelOf = (el) => {{
                    if (el.id) {{
                        const label = document.querySelector('label[for="' + CSS.escape(el.id) + '"]');
                        if (text(label)) return text(label);
                    }}
                    const wrap = el.closest('label');
                    if (text(wrap)) return text(wrap);
                    return (el.getAttribute('aria-label') || el.getAttribute('placeholder') || el.name || '').trim();
                }};
                const visible = (el) => !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);
                const fields = [];

                root.querySelectorAll('input, textarea, select').forEach((el) => {{
                    const type = (el.type || '').toLowerCase();
                    if (['hidden', 'submit', 'button', 'reset', 'image', 'radio', 'checkbox'].includes(type)) return;
                    if (type !== 'file' && !visible(el)) return;

                    let kind = 'free_text';
                    let options = [];
                    let value = el.value ? String(el.value) : null;

                    if (el.tagName === 'SELECT') {{
                        kind = el.multiple ? 'enum_multi' : 'enum_single';
                        options = Array.from(el.options).map((o) => o.text.trim()).filter((t) => t);
                        const picked = Array.from(el.selectedOptions || []).map((o) => o.text.trim());
                        value = picked.length ? picked.join(', ') : null;
                    }} else if (type === 'file') {{
                        kind = 'attachment';
                        value = el.files && el.files.length ? el.files[0].name : null;
                    }} else if (type === 'number') {{
                        kind = 'numeric';
                    }}

                    fields.push({{
                        control_id: tag(el),
                        kind,
                        purpose: labelOf(el),
                        required: el.required || el.getAttribute('aria-required') === 'true',
                        options,
                        current_value: value,
                    }});
                }});

                root.querySelectorAll('fieldset').forEach((fs) => {{
                    const inputs = Array.from(fs.querySelectorAll('input[type="radio"], input[type="checkbox"]'));
                    if (!inputs.length) return;
                    const checked = inputs.filter((i) => i.checked).map(labelOf);
                    fields.push({{
                        control_id: tag(fs),
                        kind: inputs[0].type === 'checkbox' ? 'enum_multi' : 'enum_single',
                        purpose: text(fs.querySelector('legend')) || (fs.getAttribute('aria-label') || '').trim(),
                        required: inputs.some((i) => i.required) || fs.getAttribute('aria-required') === 'true',
                        options: inputs.map(labelOf),
                        current_value: checked.length ? checked.join(', ') : null,
                    }});
                }});

                document.body.dataset.aaCounter = String(counter);
                return fields;
            }})()
            "#
        );

        let fields: Vec<FieldDescriptor> = self.executor.eval_as(js_code).await?;
        debug!("扫描到 {} 个字段", fields.len());
        Ok(fields)
    }

    async fn set_value(&self, field: &FieldDescriptor, value: &str) -> Result<(), BrowserError> {
        if field.kind == FieldKind::Attachment {
            return self.upload_file(field, value).await;
        }

        let control_id = serde_json::to_string(&field.control_id).unwrap_or_default();
        let value_json = serde_json::to_string(value).unwrap_or_default();
        let js_code = format!(
            r#"
            (() => {{
                const el = document.querySelector('[data-aa-id="' + {control_id} + '"]');
                if (!el) return {{ ok: false, reason: 'control not found' }};
                const wanted = {value_json};
                const norm = (s) => String(s || '').trim().toLowerCase();
                const fire = (target) => {{
                    target.dispatchEvent(new Event('input', {{ bubbles: true }}));
                    target.dispatchEvent(new Event('change', {{ bubbles: true }}));
                }};
                const labelOf = (input) => {{
                    const label = input.id ? document.querySelector('label[for="' + CSS.escape(input.id) + '"]') : input.closest('label');
                    return (label ? label.innerText : input.value || '').trim();
                }};

                if (el.tagName === 'FIELDSET') {{
                    const values = el.querySelector('input[type="checkbox"]') ? wanted.split(',').map(norm) : [norm(wanted)];
                    let hit = 0;
                    el.querySelectorAll('input[type="radio"], input[type="checkbox"]').forEach((input) => {{
                        const match = values.includes(norm(labelOf(input)));
                        if (match !== input.checked && (match || input.type === 'checkbox')) {{
                            input.click();
                        }}
                        if (match) hit += 1;
                    }});
                    return hit ? {{ ok: true }} : {{ ok: false, reason: 'option not found' }};
                }}

                if (el.tagName === 'SELECT') {{
                    const values = el.multiple ? wanted.split(',').map(norm) : [norm(wanted)];
                    let hit = 0;
                    Array.from(el.options).forEach((option) => {{
                        option.selected = values.includes(norm(option.text));
                        if (option.selected) hit += 1;
                    }});
                    fire(el);
                    return hit ? {{ ok: true }} : {{ ok: false, reason: 'option not found' }};
                }}

                const proto = el.tagName === 'TEXTAREA' ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
                const setter = Object.getOwnPropertyDescriptor(proto, 'value').set;
                el.focus();
                setter.call(el, wanted);
                fire(el);
                el.blur();
                return norm(el.value) === norm(wanted) ? {{ ok: true }} : {{ ok: false, reason: 'value rejected' }};
            }})()
            "#
        );

        self.run_action("set_value", js_code).await
    }

    async fn find_action_control(&self) -> Result<Option<ActionControl>, BrowserError> {
        let keywords = serde_json::to_string(ACTION_KEYWORDS).unwrap_or_else(|_| "[]".into());
        let js_code = format!(
            r#"
            (() => {{
                const root = {ROOT_JS};
                const buttons = Array.from(root.querySelectorAll('button, input[type="submit"]'))
                    .filter((b) => !b.disabled && (b.offsetWidth || b.offsetHeight));
                const labelOf = (b) => ((b.getAttribute('aria-label') || '') + ' ' + (b.innerText || b.value || '')).trim();
                for (const keyword of {keywords}) {{
                    const button = buttons.find((b) => labelOf(b).toLowerCase().includes(keyword));
                    if (button) {{
                        if (!button.dataset.aaId) {{
                            const counter = Number(document.body.dataset.aaCounter || 0) + 1;
                            document.body.dataset.aaCounter = String(counter);
                            button.dataset.aaId = 'aa-' + counter;
                        }}
                        return {{ control_id: button.dataset.aaId, label: labelOf(button) }};
                    }}
                }}
                return {{ control_id: null, label: '' }};
            }})()
            "#
        );

        #[derive(Deserialize)]
        struct RawAction {
            control_id: Option<String>,
            #[serde(default)]
            label: String,
        }

        let raw: RawAction = self.executor.eval_as(js_code).await?;
        Ok(raw
            .control_id
            .map(|control_id| ActionControl::new(control_id, raw.label)))
    }

    async fn click_action(&self, control: &ActionControl) -> Result<(), BrowserError> {
        let control_id = serde_json::to_string(&control.control_id).unwrap_or_default();
        let js_code = format!(
            r#"
            (() => {{
                const el = document.querySelector('[data-aa-id="' + {control_id} + '"]');
                if (!el) return {{ ok: false, reason: 'action control disappeared' }};
                el.click();
                return {{ ok: true }};
            }})()
            "#
        );
        self.run_action("click_action", js_code).await?;
        sleep(SETTLE_DELAY).await;
        Ok(())
    }

    async fn dismiss_form(&self) -> Result<(), BrowserError> {
        let js_code = r#"
            (() => {
                const close = document.querySelector('[role="dialog"] button[aria-label*="Dismiss"], [role="dialog"] button[aria-label*="Descartar"], [role="dialog"] button[aria-label*="Cerrar"]');
                if (close) close.click();
                return !!close;
            })()
        "#;
        let closed: bool = self.executor.eval_as(js_code).await?;
        if !closed {
            return Ok(());
        }
        sleep(Duration::from_millis(500)).await;

        let confirm_js = r#"
            (() => {
                const buttons = Array.from(document.querySelectorAll('[role="alertdialog"] button, [role="dialog"] button'));
                const discard = buttons.find((b) => /discard|descartar/i.test(b.innerText || ''));
                if (discard) discard.click();
                return true;
            })()
        "#;
        self.executor.eval(confirm_js).await?;
        Ok(())
    }
}
