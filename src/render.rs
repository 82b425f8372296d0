//! Formats a `Digest` into an HTML document and a plain-text fallback for
//! the delivery adapter. Pure transform — no detector logic, no I/O.
//! spec.md §4.7.

use crate::alert::Priority;
use crate::consolidator::Digest;
use std::fmt::Write as _;

pub struct DigestRenderer;

impl DigestRenderer {
    pub fn render_html(&self, digest: &Digest) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "<html><body>");
        let _ = writeln!(out, "<h1>Analytics Digest — {}</h1>", digest.reference_date);

        if digest.alerts.is_empty() {
            let _ = writeln!(out, "<p><strong>All clear.</strong> No anomalies detected across monitored properties.</p>");
        } else {
            let _ = writeln!(out, "<p>{} alert(s) across {} propert{}.</p>", digest.alerts.len(), digest.property_rollups.len(), if digest.property_rollups.len() == 1 { "y" } else { "ies" });
        }

        for rollup in &digest.property_rollups {
            let _ = writeln!(out, "<h2>{}</h2>", rollup.property_id);
            if rollup.all_clear {
                let _ = writeln!(out, "<p>All clear.</p>");
                continue;
            }
            if rollup.suppressed_count > 0 {
                let _ = writeln!(out, "<p><em>{} additional lower-priority alert(s) suppressed by the per-property cap.</em></p>", rollup.suppressed_count);
            }
            let _ = writeln!(out, "<table border=\"1\" cellpadding=\"4\">");
            let _ = writeln!(out, "<tr><th>Priority</th><th>Detector</th><th>Dimension</th><th>Metric</th><th>Message</th></tr>");
            for alert in digest.alerts.iter().filter(|a| a.property_id == rollup.property_id) {
                let _ = writeln!(
                    out,
                    "<tr><td>{}</td><td>{}</td><td>{} / {}</td><td>{}</td><td>{}</td></tr>",
                    priority_label(alert.priority),
                    alert.detector_kind.as_str(),
                    alert.dimension.as_str(),
                    if alert.dimension_value.is_empty() { "overall" } else { &alert.dimension_value },
                    alert.metric.as_str(),
                    html_escape(&alert.message),
                );
            }
            let _ = writeln!(out, "</table>");
        }

        if !digest.issues.is_empty() {
            let _ = writeln!(out, "<h2>Issues</h2><ul>");
            for issue in &digest.issues {
                let _ = writeln!(out, "<li>{}: {} ({})</li>", html_escape(&issue.property_id), html_escape(&issue.reason_code), html_escape(&issue.detail));
            }
            let _ = writeln!(out, "</ul>");
        }

        let _ = writeln!(out, "</body></html>");
        out
    }

    pub fn render_text(&self, digest: &Digest) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Analytics Digest — {}", digest.reference_date);
        let _ = writeln!(out);

        if digest.alerts.is_empty() {
            let _ = writeln!(out, "All clear. No anomalies detected across monitored properties.");
        } else {
            let _ = writeln!(out, "{} alert(s) across {} propert{}.", digest.alerts.len(), digest.property_rollups.len(), if digest.property_rollups.len() == 1 { "y" } else { "ies" });
        }
        let _ = writeln!(out);

        for rollup in &digest.property_rollups {
            let _ = writeln!(out, "== {} ==", rollup.property_id);
            if rollup.all_clear {
                let _ = writeln!(out, "  All clear.");
                let _ = writeln!(out);
                continue;
            }
            for alert in digest.alerts.iter().filter(|a| a.property_id == rollup.property_id) {
                let _ = writeln!(out, "  [{}] {}: {}", priority_label(alert.priority), alert.detector_kind.as_str(), alert.message);
            }
            if rollup.suppressed_count > 0 {
                let _ = writeln!(out, "  ({} additional lower-priority alert(s) suppressed)", rollup.suppressed_count);
            }
            let _ = writeln!(out);
        }

        if !digest.issues.is_empty() {
            let _ = writeln!(out, "== Issues ==");
            for issue in &digest.issues {
                let _ = writeln!(out, "  {}: {} ({})", issue.property_id, issue.reason_code, issue.detail);
            }
            let _ = writeln!(out);
        }
        out
    }
}

fn priority_label(priority: Priority) -> &'static str {
    match priority {
        Priority::P0 => "P0",
        Priority::P1 => "P1",
        Priority::P2 => "P2",
        Priority::P3 => "P3",
    }
}

fn html_escape(input: &str) -> String {
    input.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}
