//! Schema migration for stored session records.

use crate::models::session::{Session, SCHEMA_VERSION};
use crate::models::widget::{Widget, WidgetBody, WidgetMeta};

/// Bring a loaded record up to the current schema in place.
///
/// Returns whether the record changed and needs to be written back.
///
/// v1 records predate widgets: their plan output lives only in the flat log.
/// Migration synthesizes a terminal widget titled `Plan Log` carrying a copy
/// of those lines and wires it up as the active terminal, so old transcripts
/// render exactly like new ones. The synthesized widget carries no role tag;
/// role-tagged widgets only appear once a run is started against the record.
pub fn migrate_session(session: &mut Session) -> bool {
    if session.version >= SCHEMA_VERSION {
        return false;
    }

    if session.widgets.is_empty() && !session.logs.is_empty() {
        let mut widget = Widget::terminal("Plan Log", WidgetMeta::default());
        widget.body = WidgetBody::Terminal {
            lines: session.logs.clone(),
        };
        session.active_terminal_handle = Some(widget.id.clone());
        session.widgets.push(widget);
    }

    session.phase = session.derived_phase();
    session.version = SCHEMA_VERSION;
    true
}
