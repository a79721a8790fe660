use echobeats_core::{Event, LaneId, ReconciledSnapshot};
use echobeats_runtime::{Metrics, RunReport};
use serde::Serialize;

pub struct FormatOptions {
    /// One JSON object per line instead of the text layout
    pub json: bool,
    /// Print handler payloads under each lane
    pub show_payloads: bool,
    /// Skip idle lanes in the text layout
    pub hide_idle: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            json: false,
            show_payloads: false,
            hide_idle: true,
        }
    }
}

const MAX_PAYLOAD_CHARS: usize = 120;

pub fn format_snapshot(snapshot: &ReconciledSnapshot, opts: &FormatOptions) -> String {
    if opts.json {
        return json_line(snapshot);
    }

    let mut out = String::new();
    out.push_str(&format!(
        "─── step {} [cycle {} beat {}] {} holder={} coherence={:.2} ───\n",
        snapshot.step,
        snapshot.step.cycle(),
        snapshot.step.beat(),
        format_timestamp(&snapshot.events[0].emitted_at),
        snapshot.stabilizer.holder,
        snapshot.coherence
    ));

    for lane in LaneId::ALL {
        let event = snapshot.event(lane);
        if opts.hide_idle && event.is_noop() && !event.degraded {
            continue;
        }
        format_event(&mut out, event, opts);
    }

    for conflict in &snapshot.conflicts {
        let lane = conflict.lane.map(|l| l.name()).unwrap_or("-");
        out.push_str(&format!(
            "  ! {:?} {}: {}\n",
            conflict.kind, lane, conflict.detail
        ));
    }

    out
}

fn format_event(out: &mut String, event: &Event, opts: &FormatOptions) {
    let operation = event.operation.map(|op| op.name()).unwrap_or("·");
    let mode = event.mode.map(|m| m.to_string()).unwrap_or_default();
    out.push_str(&format!("  {:<11}{:<16}{:<11}", event.lane.name(), operation, mode));
    if event.degraded {
        out.push_str(&format!(
            " DEGRADED ({})",
            event.reason.as_deref().unwrap_or("unknown")
        ));
    }
    out.push('\n');

    if opts.show_payloads {
        if let Some(payload) = &event.payload {
            out.push_str(&format!("    → {}\n", truncate(&payload.to_string())));
        }
    }
}

pub fn format_metrics(metrics: &Metrics, opts: &FormatOptions) -> String {
    if opts.json {
        return json_line(metrics);
    }
    let last = metrics
        .last_step
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "═══ {} steps ({} cycles) up to step {} ═══\n\
         coherence: {:.3} avg\n\
         degraded events: {}  conflicts: {}\n\
         expressive/reflective: {}/{}\n\
         phase transitions: affordance={} relevance={} salience={}\n\
         step latency: {:.1} ms avg\n",
        metrics.steps_processed,
        metrics.cycles_completed,
        last,
        metrics.average_coherence,
        metrics.degraded_event_count,
        metrics.conflict_count,
        metrics.expressive_events,
        metrics.reflective_events,
        metrics.phase_transitions[0],
        metrics.phase_transitions[1],
        metrics.phase_transitions[2],
        metrics.average_step_ms
    )
}

pub fn format_report(report: &RunReport, opts: &FormatOptions) -> String {
    if opts.json {
        return json_line(report);
    }
    let mut out = format_metrics(&report.metrics, opts);
    for state in &report.lanes {
        let last = state
            .last_operation
            .map(|op| op.name())
            .unwrap_or("-");
        out.push_str(&format!(
            "  {:<11}active={:<6}degraded={:<6}last={}\n",
            state.lane.name(),
            state.active_steps,
            state.degraded_steps,
            last
        ));
    }
    out
}

fn json_line<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
}

fn truncate(s: &str) -> String {
    if s.chars().count() > MAX_PAYLOAD_CHARS {
        let head: String = s.chars().take(MAX_PAYLOAD_CHARS).collect();
        format!("{}...", head)
    } else {
        s.to_string()
    }
}

/// Wall-clock time an event was emitted, for log correlation.
pub fn format_timestamp(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.format("%H:%M:%S%.3f").to_string()
}
