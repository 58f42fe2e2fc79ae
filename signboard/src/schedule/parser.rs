//! Schedule document parsing.
//!
//! The CMS delivers the schedule as XML: a `<schedule>` root with `layout`,
//! `default`, `command`, `overlays`, and `actions` children. Parsing is
//! deliberately forgiving at the field level: a malformed scalar attribute
//! degrades to a safe default with an audit log, and only an item whose
//! layout id cannot be recovered at all is dropped. A document that cannot be
//! parsed, or that contains nothing recognisable, falls back to the splash
//! schedule so the player always has something to show.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;
use tracing::{debug, warn};

use crate::geo::GeoFence;
use crate::schedule::action::ScheduleAction;
use crate::schedule::command::ScheduleCommand;
use crate::schedule::item::{NodeKind, ScheduleItem};

/// Timestamp layout used by the CMS, invariant-culture UTC.
const DT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Document-level parse errors.
///
/// Item-level problems never surface here; they degrade or drop the single
/// item. A document-level error means the caller should install the splash
/// fallback.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The XML stream is malformed beyond recovery.
    #[error("schedule XML malformed at byte {position}: {message}")]
    Xml {
        /// Byte offset the reader stopped at.
        position: u64,
        /// Underlying reader error.
        message: String,
    },
}

/// The parsed schedule document.
#[derive(Debug, Clone, Default)]
pub struct ScheduleDocument {
    /// `layout` and `default` nodes, in document order.
    pub layouts: Vec<ScheduleItem>,
    /// `overlays/*` nodes, in document order.
    pub overlays: Vec<ScheduleItem>,
    /// `command` nodes.
    pub commands: Vec<ScheduleCommand>,
    /// `actions/*` nodes, unfiltered; the priority watermark is applied per
    /// tick because it depends on the clock and the current fix.
    pub actions: Vec<ScheduleAction>,
}

impl ScheduleDocument {
    /// The fallback document: a single splash item and nothing else.
    pub fn splash_fallback() -> Self {
        Self {
            layouts: vec![ScheduleItem::splash()],
            ..Self::default()
        }
    }

    /// Whether nothing recognisable was parsed.
    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
            && self.overlays.is_empty()
            && self.commands.is_empty()
            && self.actions.is_empty()
    }
}

/// Parse a schedule document.
///
/// `library_dir` is the content-library root layout files resolve against.
///
/// # Errors
///
/// Returns [`ParseError::Xml`] only for stream-level corruption; callers fall
/// back to [`ScheduleDocument::splash_fallback`]. A structurally sound
/// document with zero recognised children is converted to the splash
/// fallback here.
pub fn parse_schedule_xml(xml: &str, library_dir: &Path) -> Result<ScheduleDocument, ParseError> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(true);

    let mut doc = ScheduleDocument::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"schedule" => {}
                b"layout" => {
                    let attrs = collect_attrs(e);
                    let extra = read_item_children(&mut reader, b"layout")?;
                    push_item(&mut doc.layouts, attrs, extra, NodeKind::Layout, library_dir);
                }
                b"default" => {
                    let attrs = collect_attrs(e);
                    let extra = read_item_children(&mut reader, b"default")?;
                    push_item(&mut doc.layouts, attrs, extra, NodeKind::Default, library_dir);
                }
                b"command" => {
                    let attrs = collect_attrs(e);
                    skip_element(&mut reader, b"command")?;
                    push_command(&mut doc.commands, attrs);
                }
                b"overlays" => read_overlays(&mut reader, &mut doc.overlays, library_dir)?,
                b"actions" => read_actions(&mut reader, &mut doc.actions)?,
                other => {
                    // Unknown containers (including the legacy top-level
                    // <dependants> block) are skipped whole.
                    debug!(
                        element = %String::from_utf8_lossy(other),
                        "ignoring unrecognised schedule element"
                    );
                    let name = e.name().as_ref().to_vec();
                    skip_element(&mut reader, &name)?;
                }
            },
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"layout" => {
                    push_item(&mut doc.layouts, collect_attrs(e), Vec::new(), NodeKind::Layout, library_dir)
                }
                b"default" => {
                    push_item(&mut doc.layouts, collect_attrs(e), Vec::new(), NodeKind::Default, library_dir)
                }
                b"command" => push_command(&mut doc.commands, collect_attrs(e)),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ParseError::Xml {
                    position: reader.buffer_position(),
                    message: e.to_string(),
                })
            }
        }
    }

    if doc.is_empty() {
        debug!("schedule document has no recognised children, installing splash");
        return Ok(ScheduleDocument::splash_fallback());
    }

    Ok(doc)
}

/// Read the `<overlays>` container: each child parses like a layout item.
fn read_overlays(
    reader: &mut Reader<&[u8]>,
    overlays: &mut Vec<ScheduleItem>,
    library_dir: &Path,
) -> Result<(), ParseError> {
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let attrs = collect_attrs(e);
                let name = e.name().as_ref().to_vec();
                let extra = read_item_children(reader, &name)?;
                push_item(overlays, attrs, extra, NodeKind::Overlay, library_dir);
            }
            Ok(Event::Empty(ref e)) => {
                push_item(overlays, collect_attrs(e), Vec::new(), NodeKind::Overlay, library_dir)
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"overlays" => return Ok(()),
            Ok(Event::Eof) => return Err(eof_error(reader, "overlays")),
            Ok(_) => {}
            Err(e) => return Err(xml_error(reader, e)),
        }
    }
}

/// Read the `<actions>` container.
fn read_actions(
    reader: &mut Reader<&[u8]>,
    actions: &mut Vec<ScheduleAction>,
) -> Result<(), ParseError> {
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let attrs = collect_attrs(e);
                let name = e.name().as_ref().to_vec();
                skip_element(reader, &name)?;
                actions.push(parse_action(attrs));
            }
            Ok(Event::Empty(ref e)) => actions.push(parse_action(collect_attrs(e))),
            Ok(Event::End(ref e)) if e.name().as_ref() == b"actions" => return Ok(()),
            Ok(Event::Eof) => return Err(eof_error(reader, "actions")),
            Ok(_) => {}
            Err(e) => return Err(xml_error(reader, e)),
        }
    }
}

/// Read an item element's children, collecting `<dependents><file>` entries.
fn read_item_children(
    reader: &mut Reader<&[u8]>,
    element: &[u8],
) -> Result<Vec<String>, ParseError> {
    let mut files = Vec::new();
    let mut in_dependents = false;
    let mut in_file = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"dependents" => in_dependents = true,
                b"file" if in_dependents => in_file = true,
                _ => {}
            },
            Ok(Event::Text(ref t)) if in_file => {
                if let Ok(text) = t.unescape() {
                    let text = text.trim();
                    if !text.is_empty() {
                        files.push(text.to_string());
                    }
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"dependents" => in_dependents = false,
                b"file" => in_file = false,
                name if name == element => return Ok(files),
                _ => {}
            },
            Ok(Event::Eof) => {
                return Err(eof_error(reader, &String::from_utf8_lossy(element)))
            }
            Ok(_) => {}
            Err(e) => return Err(xml_error(reader, e)),
        }
    }
}

/// Skip an element and its whole subtree.
fn skip_element(reader: &mut Reader<&[u8]>, element: &[u8]) -> Result<(), ParseError> {
    let mut depth = 0u32;
    loop {
        match reader.read_event() {
            Ok(Event::Start(_)) => depth += 1,
            Ok(Event::End(ref e)) => {
                if depth == 0 && e.name().as_ref() == element {
                    return Ok(());
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => return Err(eof_error(reader, &String::from_utf8_lossy(element))),
            Ok(_) => {}
            Err(e) => return Err(xml_error(reader, e)),
        }
    }
}

fn eof_error(reader: &Reader<&[u8]>, element: &str) -> ParseError {
    ParseError::Xml {
        position: reader.buffer_position(),
        message: format!("unexpected EOF inside <{element}>"),
    }
}

fn xml_error(reader: &Reader<&[u8]>, e: quick_xml::Error) -> ParseError {
    ParseError::Xml {
        position: reader.buffer_position(),
        message: e.to_string(),
    }
}

/// Collect an element's attributes into an owned map.
fn collect_attrs(e: &BytesStart) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = match attr.unescape_value() {
            Ok(v) => v.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        attrs.insert(key, value);
    }
    attrs
}

fn push_item(
    items: &mut Vec<ScheduleItem>,
    attrs: HashMap<String, String>,
    dependent_children: Vec<String>,
    kind: NodeKind,
    library_dir: &Path,
) {
    match parse_item(attrs, dependent_children, kind, library_dir) {
        Some(item) => items.push(item),
        None => warn!(?kind, "dropping unparsable schedule item"),
    }
}

/// Parse one layout-like element. Returns `None` only when the layout id is
/// unrecoverable or the window is inverted; field-level problems degrade.
fn parse_item(
    attrs: HashMap<String, String>,
    dependent_children: Vec<String>,
    kind: NodeKind,
    library_dir: &Path,
) -> Option<ScheduleItem> {
    let file_attr = attrs.get("file")?.trim();
    let id_text = file_attr.strip_suffix(".xml").unwrap_or(file_attr);
    let layout_id: i64 = match id_text.parse() {
        Ok(id) => id,
        Err(_) => {
            warn!(file = %file_attr, "layout file attribute is not an integer id");
            return None;
        }
    };

    let mut item = ScheduleItem {
        layout_id,
        schedule_id: attr_i64(&attrs, "scheduleid", 0),
        node_kind: kind,
        file: library_dir
            .join(format!("{layout_id}.xlf"))
            .to_string_lossy()
            .into_owned(),
        ..ScheduleItem::splash()
    };

    // The default item keeps an open window and baseline priority no matter
    // what the document says.
    if kind != NodeKind::Default {
        item.from_dt = attr_dt(&attrs, "fromdt", DateTime::<Utc>::MIN_UTC);
        item.to_dt = attr_dt(&attrs, "todt", DateTime::<Utc>::MAX_UTC);
        item.priority = attr_u32(&attrs, "priority", 0);
    }

    if item.from_dt > item.to_dt {
        warn!(
            layout_id,
            from = %item.from_dt,
            to = %item.to_dt,
            "dropping schedule item with inverted window"
        );
        return None;
    }

    item.share_of_voice = attr_u32(&attrs, "shareOfVoice", 0);
    item.duration_hint = attr_u32(&attrs, "duration", 0);

    item.is_geo_aware = attr_flag(&attrs, "isGeoAware");
    if item.is_geo_aware {
        if let Some(geojson) = attrs.get("geoLocation").filter(|v| !v.trim().is_empty()) {
            match GeoFence::parse(geojson) {
                Ok(fence) => item.geo_fence = Some(fence),
                // A geo-aware item with a broken fence stays geo-aware and is
                // never geo-active, matching the error contract.
                Err(e) => warn!(layout_id, error = %e, "unparsable geofence"),
            }
        }
    }

    // Cycle configuration degrades to "off" as a unit: a cycle flag with no
    // usable group key cannot be grouped.
    item.is_cycle_playback = attr_flag(&attrs, "cyclePlayback");
    if item.is_cycle_playback {
        match attrs.get("groupKey").map(|k| k.trim()) {
            Some(key) if !key.is_empty() => {
                item.cycle_group_key = key.to_string();
                item.cycle_play_count = attr_u32(&attrs, "playCount", 0);
            }
            _ => {
                warn!(layout_id, "cyclePlayback without groupKey, disabling cycle");
                item.is_cycle_playback = false;
            }
        }
    }

    if let Some(list) = attrs.get("dependents") {
        item.dependents.extend(
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
    }
    item.dependents.extend(dependent_children);

    Some(item)
}

fn push_command(commands: &mut Vec<ScheduleCommand>, attrs: HashMap<String, String>) {
    let Some(code) = attrs.get("code").map(|c| c.trim()).filter(|c| !c.is_empty()) else {
        warn!("dropping command without code");
        return;
    };
    let Some(date) = attrs.get("date").and_then(|d| parse_dt(d)) else {
        warn!(code, "dropping command with missing or malformed date");
        return;
    };
    commands.push(ScheduleCommand::new(
        date,
        code,
        attr_i64(&attrs, "scheduleid", 0),
    ));
}

fn parse_action(attrs: HashMap<String, String>) -> ScheduleAction {
    let mut action = ScheduleAction {
        priority: attr_u32(&attrs, "priority", 0),
        from_dt: attr_dt(&attrs, "fromdt", DateTime::<Utc>::MIN_UTC),
        to_dt: attr_dt(&attrs, "todt", DateTime::<Utc>::MAX_UTC),
        is_geo_aware: attr_flag(&attrs, "isGeoAware"),
        geo_fence: None,
        payload: HashMap::new(),
    };

    if action.is_geo_aware {
        if let Some(geojson) = attrs.get("geoLocation").filter(|v| !v.trim().is_empty()) {
            match GeoFence::parse(geojson) {
                Ok(fence) => action.geo_fence = Some(fence),
                Err(e) => warn!(error = %e, "unparsable action geofence"),
            }
        }
    }

    action.payload = attrs;
    action
}

fn attr_i64(attrs: &HashMap<String, String>, key: &str, default: i64) -> i64 {
    match attrs.get(key) {
        None => default,
        Some(v) => v.trim().parse().unwrap_or_else(|_| {
            warn!(attribute = key, value = %v, "malformed integer attribute, using default");
            default
        }),
    }
}

fn attr_u32(attrs: &HashMap<String, String>, key: &str, default: u32) -> u32 {
    match attrs.get(key) {
        None => default,
        Some(v) => v.trim().parse().unwrap_or_else(|_| {
            warn!(attribute = key, value = %v, "malformed integer attribute, using default");
            default
        }),
    }
}

/// `1` is true, anything else (including absence) is false.
fn attr_flag(attrs: &HashMap<String, String>, key: &str) -> bool {
    attrs.get(key).map(|v| v.trim() == "1").unwrap_or(false)
}

fn attr_dt(attrs: &HashMap<String, String>, key: &str, default: DateTime<Utc>) -> DateTime<Utc> {
    match attrs.get(key) {
        None => default,
        Some(v) => parse_dt(v).unwrap_or_else(|| {
            warn!(attribute = key, value = %v, "malformed timestamp attribute, using default");
            default
        }),
    }
}

fn parse_dt(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), DT_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
