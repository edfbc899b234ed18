//! Terminal formatting shared by the CLI commands.

use chrono::{DateTime, Utc};
use parceltrack_core::rest::HistoryEntry;
use parceltrack_core::{ConnectionStatus, ShipmentView};

const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const YELLOW: &str = "\x1b[33m";
const GREEN: &str = "\x1b[32m";
const RESET: &str = "\x1b[0m";

/// Resolve `--color` against the terminal.
pub fn resolve_color(color: &str) -> bool {
    use std::io::IsTerminal;
    match color {
        "always" => true,
        "never" => false,
        _ => std::io::stdout().is_terminal(),
    }
}

/// `[####------] 40%`
pub fn progress_bar(percent: u8, width: usize) -> String {
    let filled = usize::from(percent.min(100)) * width / 100;
    format!(
        "[{}{}] {percent}%",
        "#".repeat(filled),
        "-".repeat(width - filled)
    )
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// One-line connection banner.
pub fn format_status(status: ConnectionStatus, use_color: bool) -> String {
    let text = status.indicator();
    match (use_color, status) {
        (false, _) => format!("* {text}"),
        (true, ConnectionStatus::Connected) => format!("{GREEN}*{RESET} {text}"),
        (true, _) => format!("{YELLOW}*{RESET} {DIM}{text}{RESET}"),
    }
}

/// Multi-line shipment summary: header, route progress, truck and comment.
pub fn format_view(view: &ShipmentView, use_color: bool) -> String {
    let snap = &view.snapshot;
    let mut status = snap.status_display.clone();
    if view.highlighted {
        status = if use_color {
            format!("{BOLD}{YELLOW}{status}{RESET}")
        } else {
            format!("{status} (updated)")
        };
    }

    let mut lines = vec![format!(
        "{}  {status}  {}",
        snap.tracking_number,
        format_timestamp(snap.last_applied_timestamp)
    )];

    match &view.projection {
        Some(p) => lines.push(format!(
            "  route    {}  {:.1} of {:.1} traveled",
            progress_bar(p.progress_percent, 20),
            p.traveled,
            p.distance
        )),
        None => lines.push("  route    (no route geometry)".to_string()),
    }
    if let Some(loc) = snap.current_location {
        let truck = snap.truck_status.as_deref().unwrap_or("-");
        lines.push(format!("  truck    {truck} at ({:.1}, {:.1})", loc.x, loc.y));
    }
    if let Some(comment) = &snap.last_comment {
        lines.push(format!("  comment  {comment}"));
    }

    let out = lines.join("\n");
    if use_color && snap.status.is_terminal() {
        format!("{DIM}{out}{RESET}")
    } else {
        out
    }
}

pub fn format_history(entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return "(no history recorded)".to_string();
    }
    entries
        .iter()
        .map(|e| {
            let display = e
                .status_display
                .as_deref()
                .unwrap_or_else(|| e.status.display_name());
            match e.comment.as_deref().filter(|c| !c.is_empty()) {
                Some(c) => format!("{}  {display:<20}  {c}", format_timestamp(e.timestamp)),
                None => format!("{}  {display}", format_timestamp(e.timestamp)),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use parceltrack_core::{
        EventSource, Point2D, ShipmentSnapshot, ShipmentStatus, TrackingEvent, TrackingNumber,
        Viewport, project,
    };

    use super::*;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).expect("valid")
    }

    fn view() -> ShipmentView {
        let mut event = TrackingEvent::status_change(
            TrackingNumber::parse("UPS1").expect("valid"),
            ShipmentStatus::InTransit,
            ts(0),
            EventSource::Poll,
        );
        event.origin = Some(Point2D::new(0.0, 0.0));
        event.destination = Some(Point2D::new(100.0, 0.0));
        event.current_location = Some(Point2D::new(40.0, 0.0));
        event.truck_status = Some("ON_ROUTE".to_string());
        let snapshot = ShipmentSnapshot::from_event(&event);
        let projection = project(&snapshot, &Viewport::default());
        ShipmentView {
            snapshot,
            projection,
            highlighted: false,
        }
    }

    #[test]
    fn progress_bar_bounds() {
        assert_eq!(progress_bar(0, 10), "[----------] 0%");
        assert_eq!(progress_bar(40, 10), "[####------] 40%");
        assert_eq!(progress_bar(100, 10), "[##########] 100%");
    }

    #[test]
    fn view_plain() {
        let out = format_view(&view(), false);
        assert_eq!(
            out,
            "UPS1  In Transit  1970-01-01 00:00:00 UTC\n\
             \x20 route    [########------------] 40%  40.0 of 100.0 traveled\n\
             \x20 truck    ON_ROUTE at (40.0, 0.0)"
        );
    }

    #[test]
    fn highlighted_view_is_marked() {
        let mut v = view();
        v.highlighted = true;
        assert!(format_view(&v, false).contains("In Transit (updated)"));
    }

    #[test]
    fn view_without_geometry() {
        let mut v = view();
        v.projection = None;
        assert!(format_view(&v, false).contains("(no route geometry)"));
    }

    #[test]
    fn status_plain() {
        assert_eq!(
            format_status(ConnectionStatus::Connected, false),
            "* Real-time updates active"
        );
    }

    #[test]
    fn history_lines() {
        let entries = vec![
            HistoryEntry {
                status: ShipmentStatus::Created,
                status_display: None,
                timestamp: ts(0),
                comment: None,
            },
            HistoryEntry {
                status: ShipmentStatus::PickedUp,
                status_display: Some("Picked Up".to_string()),
                timestamp: ts(60),
                comment: Some("at dock".to_string()),
            },
        ];
        let out = format_history(&entries);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "1970-01-01 00:00:00 UTC  Created");
        assert!(lines[1].ends_with("Picked Up             at dock"));
        assert_eq!(format_history(&[]), "(no history recorded)");
    }
}
