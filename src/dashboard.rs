// src/dashboard.rs
//! Server-rendered dashboard page: live feed, alerts, map, source breakdown and
//! the query box. Refreshes itself unless it is showing an answer.

use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use std::fmt::Write as _;

use crate::config::{AreaConfig, Mode};
use crate::event::EventRecord;
use crate::store::{MapPoint, StoreStats};
use crate::summary::SourceCount;

const MAP_W: f64 = 480.0;
const MAP_H: f64 = 320.0;

/// Answer shown under the query box.
pub enum QueryOutcome<'a> {
    Answer(&'a str),
    Failed(&'a str),
}

pub struct DashboardView<'a> {
    pub title: &'a str,
    pub mode: Mode,
    pub refresh_secs: u64,
    pub area: &'a AreaConfig,
    pub recent: &'a [EventRecord],
    pub anomalies: &'a [EventRecord],
    pub points: &'a [MapPoint],
    pub stats: &'a StoreStats,
    pub breakdown: &'a [SourceCount],
    pub documents: usize,
    pub query: Option<(&'a str, QueryOutcome<'a>)>,
}

pub fn render(v: &DashboardView<'_>) -> String {
    let mut h = String::with_capacity(16 * 1024);

    let _ = write!(
        h,
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{}</title>",
        text(v.title)
    );
    if v.query.is_none() {
        let _ = write!(h, "<meta http-equiv=\"refresh\" content=\"{}\">", v.refresh_secs);
    }
    h.push_str(STYLE);
    h.push_str("</head><body>");

    let _ = write!(
        h,
        "<h1>{}</h1><p class=\"sub\">mode: {} &middot; events: {} &middot; anomalies: {} &middot; indexed: {}</p>",
        text(v.title),
        v.mode.as_str(),
        v.stats.total,
        v.stats.anomalies,
        v.documents
    );

    render_query(&mut h, v.query.as_ref());

    h.push_str("<div class=\"grid\"><section><h2>Live feed</h2>");
    render_records(&mut h, v.recent, false);
    h.push_str("</section><section><h2>Anomalies</h2>");
    if v.anomalies.is_empty() {
        h.push_str("<p class=\"muted\">No anomalies detected yet.</p>");
    } else {
        render_records(&mut h, v.anomalies, true);
    }
    h.push_str("</section></div>");

    h.push_str("<div class=\"grid\"><section><h2>Map</h2>");
    render_map(&mut h, v.area, v.points);
    h.push_str("</section><section><h2>Events by source</h2>");
    render_breakdown(&mut h, v.breakdown);
    h.push_str("</section></div></body></html>");
    h
}

fn render_query(h: &mut String, q: Option<&(&str, QueryOutcome<'_>)>) {
    let current = q.map(|(question, _)| *question).unwrap_or_default();
    let _ = write!(
        h,
        "<form method=\"get\" action=\"/\"><input name=\"q\" size=\"60\" \
         placeholder=\"Ask about the current situation\" value=\"{}\"> \
         <button type=\"submit\">Ask</button></form>",
        attr(current)
    );
    match q {
        Some((_, QueryOutcome::Answer(a))) => {
            let _ = write!(h, "<div class=\"answer\">{}</div>", text(a));
        }
        Some((_, QueryOutcome::Failed(e))) => {
            let _ = write!(h, "<div class=\"answer err\">Query failed: {}</div>", text(e));
        }
        None => {}
    }
}

fn render_records(h: &mut String, rows: &[EventRecord], with_anomaly: bool) {
    h.push_str("<table><tr><th>time</th><th>source</th><th>location</th>");
    if with_anomaly {
        h.push_str("<th>type</th><th>description</th>");
    } else {
        h.push_str("<th>data</th>");
    }
    h.push_str("</tr>");

    // Newest on top.
    for r in rows.iter().rev() {
        let _ = write!(
            h,
            "<tr{}><td>{}</td><td>{}</td><td>{:.4}, {:.4}</td>",
            if r.is_anomaly() { " class=\"alert\"" } else { "" },
            text(&r.timestamp),
            text(r.source.as_str()),
            r.location.lat,
            r.location.lon
        );
        match (&r.anomaly, with_anomaly) {
            (Some(a), true) => {
                let _ = write!(
                    h,
                    "<td>{}</td><td>{}</td>",
                    text(&a.kind.label()),
                    text(&a.description)
                );
            }
            (None, true) => h.push_str("<td></td><td></td>"),
            (_, false) => {
                let data = serde_json::to_string(&r.payload).unwrap_or_default();
                let _ = write!(h, "<td><code>{}</code></td>", text(&data));
            }
        }
        h.push_str("</tr>");
    }
    h.push_str("</table>");
}

/// Projects points into the configured bounding box.
fn render_map(h: &mut String, area: &AreaConfig, points: &[MapPoint]) {
    let lat_span = (area.lat_max - area.lat_min).max(f64::EPSILON);
    let lon_span = (area.lon_max - area.lon_min).max(f64::EPSILON);

    let _ = write!(
        h,
        "<svg width=\"{MAP_W}\" height=\"{MAP_H}\" class=\"map\"><rect width=\"100%\" height=\"100%\" fill=\"#f4f6f8\"/>"
    );
    for p in points {
        let x = ((p.lon - area.lon_min) / lon_span).clamp(0.0, 1.0) * MAP_W;
        let y = (1.0 - ((p.lat - area.lat_min) / lat_span).clamp(0.0, 1.0)) * MAP_H;
        let (r, fill) = if p.anomaly { (6, "#d62728") } else { (3, "#1f77b4") };
        let _ = write!(
            h,
            "<circle cx=\"{x:.1}\" cy=\"{y:.1}\" r=\"{r}\" fill=\"{fill}\"><title>{}</title></circle>",
            text(&p.label)
        );
    }
    h.push_str("</svg>");
}

fn render_breakdown(h: &mut String, rows: &[SourceCount]) {
    if rows.is_empty() {
        h.push_str("<p class=\"muted\">No data yet.</p>");
        return;
    }
    h.push_str("<table>");
    for c in rows {
        let _ = write!(
            h,
            "<tr><td>{}</td><td>{}</td><td><div class=\"bar\" style=\"width:{:.0}px\"></div></td></tr>",
            text(&c.source),
            c.count,
            c.share * 200.0
        );
    }
    h.push_str("</table>");
}

const STYLE: &str = "<style>\
body{font-family:system-ui,sans-serif;margin:1.5rem;color:#222}\
.sub,.muted{color:#666}\
.grid{display:grid;grid-template-columns:1fr 1fr;gap:1.5rem}\
table{border-collapse:collapse;font-size:.85rem;width:100%}\
td,th{border-bottom:1px solid #ddd;padding:.25rem .4rem;text-align:left;vertical-align:top}\
tr.alert{background:#fdecea}\
.answer{margin:.8rem 0;padding:.6rem;background:#eef5ff;border-radius:4px}\
.answer.err{background:#fdecea}\
.bar{height:.7rem;background:#1f77b4}\
</style>";
