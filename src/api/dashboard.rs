use std::fmt::Write;

use crate::config::DASHBOARD_REFRESH_SECS;
use crate::registry::NodeStatus;

/// Render the fleet dashboard. Pure function of the registry rows; all
/// staleness classification already happened in `list_active`; this only
/// formats.
pub fn render_dashboard(rows: &[NodeStatus], now: f64) -> String {
    let mut cards = String::new();
    for status in rows {
        let r = &status.record;
        let (class, label) = if status.online {
            ("node-card active", "ONLINE")
        } else {
            ("node-card", "TIMED_OUT")
        };
        let _ = write!(
            cards,
            r#"
        <div class="{class}">
            <div class="uuid">NODE_ID: {id}</div>
            <div><span class="label">Power:</span> <span class="metric">{power:.0} mW</span></div>
            <div><span class="label">Accumulated:</span> <span class="metric valor">{valor:.6} VLR</span></div>
            <div class="status">STATUS: {label}</div>
        </div>"#,
            class = class,
            id = escape(&r.node_id),
            power = r.last_power_mw,
            valor = r.cumulative_valor,
            label = label,
        );
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>VALOR CORE | NODE FLEET</title>
    <meta http-equiv="refresh" content="{refresh}">
    <style>
        body {{ background-color: #000; color: #00FF00; font-family: 'Courier New', monospace; padding: 30px; }}
        h1 {{ font-size: 20px; border-bottom: 2px solid #00FF00; display: inline-block; padding-bottom: 5px; }}
        .grid {{ display: grid; grid-template-columns: repeat(auto-fill, minmax(300px, 1fr)); gap: 15px; margin-top: 20px; }}
        .node-card {{ border: 1px solid #004400; padding: 15px; background: #050505; }}
        .node-card.active {{ border-color: #00FF00; box-shadow: 0 0 10px #004400; }}
        .uuid {{ font-size: 10px; color: #888; margin-bottom: 10px; }}
        .metric {{ font-size: 18px; color: #FFF; }}
        .valor {{ color: #FFAA00; }}
        .label {{ font-size: 9px; color: #00FF00; text-transform: uppercase; }}
        .status {{ font-size: 9px; margin-top: 10px; }}
        .footer {{ margin-top: 40px; font-size: 10px; color: #444; }}
    </style>
</head>
<body>
    <h1>VALOR CORE :: NODE_FLEET</h1>
    <div class="grid">{cards}
    </div>
    <div class="footer">&gt; NODES_TOTAL: {total} | SYSTEM_CLOCK: {now:.0}</div>
</body>
</html>
"#,
        refresh = DASHBOARD_REFRESH_SECS,
        cards = cards,
        total = rows.len(),
        now = now,
    )
}

/// Node ids are opaque strings from the wire; escape them before they hit
/// the page.
fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeRecord;

    fn status(node_id: &str, online: bool) -> NodeStatus {
        NodeStatus {
            record: NodeRecord {
                node_id: node_id.to_string(),
                last_power_mw: 12_345.0,
                cumulative_valor: 0.123456,
                last_seen: 1_000.0,
            },
            online,
        }
    }

    #[test]
    fn online_and_timed_out_rows_render_distinctly() {
        let html = render_dashboard(&[status("VLR-AAAA0001", true), status("VLR-BBBB0002", false)], 1_030.0);
        assert!(html.contains("VLR-AAAA0001"));
        assert!(html.contains("ONLINE"));
        assert!(html.contains("TIMED_OUT"));
        assert!(html.contains("NODES_TOTAL: 2"));
    }

    #[test]
    fn empty_fleet_still_renders() {
        let html = render_dashboard(&[], 0.0);
        assert!(html.contains("NODES_TOTAL: 0"));
    }

    #[test]
    fn hostile_node_id_is_escaped() {
        let html = render_dashboard(&[status("<script>x</script>", true)], 1_030.0);
        assert!(!html.contains("<script>x"));
        assert!(html.contains("&lt;script&gt;"));
    }
}
