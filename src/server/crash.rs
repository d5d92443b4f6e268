use crate::error::AppError;
use crate::ui::card::{Button, Card, FormCard, FormItem, Justify, Stat};
use std::backtrace::Backtrace;
use std::error::Error as _;

pub const CRASH_CARD: &str = "error";
pub const SCOPE_NAMES: [&str; 5] = ["q.app", "q.user", "q.client", "q.events", "q.args"];

/// Everything the crash card shows: the failure trace and a dump of each
/// state scope at the time of the failure.
#[derive(Debug, Clone)]
pub struct CrashReport {
    pub app_name: String,
    pub issue_url: String,
    pub stack_trace: Vec<String>,
    pub scopes: Vec<(&'static str, Vec<String>)>,
}

impl CrashReport {
    pub fn issue_link(&self) -> String {
        format!(
            "{}/issues/new?labels=bug&template=error-report.md&title=%5BERROR%5D",
            self.issue_url.trim_end_matches('/')
        )
    }

    pub fn dump(&self) -> String {
        let mut dump = vec!["### Stack Trace".to_string(), code_block(&self.stack_trace)];
        for (name, lines) in &self.scopes {
            dump.push(format!("### {name}"));
            dump.push(code_block(lines));
        }
        dump.join("\n")
    }
}

fn code_block(lines: &[String]) -> String {
    let mut block = vec!["```".to_string()];
    block.extend(lines.iter().cloned());
    block.push("```".to_string());
    block.join("\n")
}

pub const HANDLER_FRAMES: &str = "Request handler frames:";

/// Error chain first, then the frames captured where the server caught the
/// failure. Those frames end at the request handler, not at the error site.
pub fn stack_trace(error: &AppError, backtrace: &Backtrace) -> Vec<String> {
    let mut lines = vec![format!("Error: {error}")];
    let mut source = error.source();
    while let Some(cause) = source {
        lines.push(format!("Caused by: {cause}"));
        source = cause.source();
    }
    lines.push(HANDLER_FRAMES.to_string());
    lines.extend(backtrace.to_string().lines().map(str::to_string));
    lines
}

pub fn crash_card(report: &CrashReport) -> Card {
    Card::Form(FormCard {
        zone: "main".to_string(),
        items: vec![
            FormItem::Stats {
                items: vec![Stat {
                    label: String::new(),
                    value: "Oops!".to_string(),
                    caption: "Something went wrong".to_string(),
                    icon: Some("Error".to_string()),
                }],
            },
            FormItem::Separator,
            FormItem::text_l("Apologies for the inconvenience!"),
            FormItem::buttons(vec![Button::primary("reload", "Reload")], Justify::Start),
            FormItem::Expander {
                name: "report".to_string(),
                label: "Error Details".to_string(),
                items: vec![
                    FormItem::text("To report this issue, please open an issue with the details below:"),
                    FormItem::Link {
                        label: "Open an issue".to_string(),
                        path: report.issue_link(),
                    },
                    FormItem::text_l(format!("Report Issue in App: **{}**", report.app_name)),
                    FormItem::text(report.dump()),
                ],
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::site::SiteError;
    use crate::ui::card::validate_card;

    fn report() -> CrashReport {
        let error = AppError::io(
            "/srv/generated",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        CrashReport {
            app_name: "Style Transfer".to_string(),
            issue_url: "https://example.org/repo/".to_string(),
            stack_trace: stack_trace(&error, &Backtrace::disabled()),
            scopes: SCOPE_NAMES
                .iter()
                .map(|name| (*name, vec!["initialized: true".to_string()]))
                .collect(),
        }
    }

    #[test]
    fn dump_has_trace_and_one_section_per_scope() {
        let dump = report().dump();
        assert!(dump.starts_with("### Stack Trace\n```\nError: i/o error on /srv/generated"));
        for name in SCOPE_NAMES {
            assert!(dump.contains(&format!("### {name}\n```\ninitialized: true\n```")));
        }
    }

    #[test]
    fn stack_trace_walks_error_sources() {
        let error = AppError::from(SiteError::Io {
            path: "/srv/site".into(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk gone"),
        });
        let trace = stack_trace(&error, &Backtrace::disabled());
        assert_eq!(trace[0], "Error: site i/o error on /srv/site: disk gone");
        assert_eq!(trace[1], "Caused by: disk gone");
        assert_eq!(trace[2], HANDLER_FRAMES);
    }

    #[test]
    fn crash_card_is_valid_and_offers_reload() {
        let report = report();
        let card = crash_card(&report);
        assert!(validate_card(&card).is_ok());
        assert!(matches!(
            &card.items()[3],
            FormItem::Buttons { items, .. } if items[0].name == "reload"
        ));
        assert_eq!(
            report.issue_link(),
            "https://example.org/repo/issues/new?labels=bug&template=error-report.md&title=%5BERROR%5D"
        );
    }
}
