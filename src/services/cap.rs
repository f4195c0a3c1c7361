// src/services/cap.rs

//! Common Alerting Protocol (CAP 1.2) alert feed.
//!
//! Feeds wrap any number of `alert` elements, sometimes inside an EDXL or
//! Atom envelope, so elements are matched on local name at any depth.

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::FetchError;
use crate::models::{CapAreaRecord, CapRecord, RawRecord, SourceKind};

use super::{Endpoint, SourceAdapter};

/// Adapter for a CAP XML endpoint.
pub struct CapSource {
    endpoint: Endpoint,
}

impl CapSource {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl SourceAdapter for CapSource {
    fn name(&self) -> &str {
        &self.endpoint.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Cap
    }

    async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError> {
        let body = self.endpoint.get().await?;
        let alerts = parse_cap(&body)?;
        Ok(alerts.into_iter().map(RawRecord::Cap).collect())
    }
}

/// Parser state for the alert currently open.
#[derive(Default)]
struct OpenAlert {
    record: CapRecord,
    info_blocks: usize,
    area: Option<CapAreaRecord>,
}

impl OpenAlert {
    /// Only the first `info` block is read.
    fn in_first_info(&self) -> bool {
        self.info_blocks == 1
    }
}

/// Parse a CAP document into one record per `alert`.
///
/// Alerts lacking an `identifier` or an `info` block are skipped.
pub fn parse_cap(xml: &str) -> Result<Vec<CapRecord>, FetchError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut alerts = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut open: Option<OpenAlert> = None;
    let mut saw_root = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                saw_root = true;
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                text.clear();
                match name.as_str() {
                    "alert" => open = Some(OpenAlert::default()),
                    "info" => {
                        if let Some(alert) = open.as_mut() {
                            alert.info_blocks += 1;
                        }
                    }
                    "area" => {
                        if let Some(alert) = open.as_mut().filter(|a| a.in_first_info()) {
                            alert.area = Some(CapAreaRecord::default());
                        }
                    }
                    _ => {}
                }
                stack.push(name);
            }
            Ok(Event::Empty(_)) => saw_root = true,
            Ok(Event::Text(t)) => {
                let chunk = t.unescape().map_err(FetchError::payload)?;
                text.push_str(&chunk);
            }
            Ok(Event::CData(c)) => {
                text.push_str(&String::from_utf8_lossy(&c.into_inner()));
            }
            Ok(Event::End(_)) => {
                let Some(name) = stack.pop() else {
                    continue;
                };
                let value = std::mem::take(&mut text).trim().to_string();
                let parent = stack.last().map(String::as_str);
                close_element(&mut open, &mut alerts, &name, parent, value);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(FetchError::payload(format!(
                    "XML error at byte {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    if !saw_root {
        return Err(FetchError::payload("document has no elements"));
    }
    Ok(alerts)
}

fn close_element(
    open: &mut Option<OpenAlert>,
    alerts: &mut Vec<CapRecord>,
    name: &str,
    parent: Option<&str>,
    value: String,
) {
    if name == "alert" {
        if let Some(alert) = open.take() {
            if alert.record.identifier.is_some() && alert.info_blocks > 0 {
                alerts.push(alert.record);
            } else {
                log::debug!(
                    "Skipping CAP alert {:?} without identifier or info",
                    alert.record.identifier
                );
            }
        }
        return;
    }

    let Some(alert) = open.as_mut() else {
        return;
    };
    let value = Some(value).filter(|v| !v.is_empty());

    match parent {
        Some("alert") => {
            let record = &mut alert.record;
            match name {
                "identifier" => record.identifier = value,
                "sender" => record.sender = value,
                "msgType" => record.msg_type = value,
                "sent" => record.sent = value,
                _ => {}
            }
        }
        Some("info") if alert.in_first_info() => {
            let record = &mut alert.record;
            let slot = match name {
                "senderName" => &mut record.sender_name,
                "event" => &mut record.event,
                "headline" => &mut record.headline,
                "description" => &mut record.description,
                "instruction" => &mut record.instruction,
                "severity" => &mut record.severity,
                "urgency" => &mut record.urgency,
                "certainty" => &mut record.certainty,
                "effective" => &mut record.effective,
                "expires" => &mut record.expires,
                "web" => &mut record.web,
                "area" => {
                    if let Some(area) = alert.area.take() {
                        record.areas.push(area);
                    }
                    return;
                }
                _ => return,
            };
            *slot = value;
        }
        Some("area") => {
            if let (Some(area), Some(value)) = (alert.area.as_mut(), value) {
                match name {
                    "areaDesc" => area.area_desc = Some(value),
                    "polygon" => area.polygons.push(value),
                    "circle" => area.circles.push(value),
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<edxlde:EDXLDistribution xmlns:edxlde="urn:oasis:names:tc:emergency:EDXL:DE:1.0">
  <edxlde:contentObject>
    <edxlde:xmlContent>
      <edxlde:embeddedXMLContent>
        <cap:alert xmlns:cap="urn:oasis:names:tc:emergency:cap:1.2">
          <cap:identifier>CFS-2026-0042</cap:identifier>
          <cap:sender>cfs.sa.gov.au</cap:sender>
          <cap:sent>2026-01-10T14:30:00+10:30</cap:sent>
          <cap:msgType>Alert</cap:msgType>
          <cap:info>
            <cap:event>Bushfire</cap:event>
            <cap:severity>Severe</cap:severity>
            <cap:urgency>Immediate</cap:urgency>
            <cap:certainty>Observed</cap:certainty>
            <cap:senderName>SA Country Fire Service</cap:senderName>
            <cap:headline>Watch and Act - Mount Barker</cap:headline>
            <cap:description><![CDATA[A bushfire is burning near <b>Mount Barker</b>.]]></cap:description>
            <cap:instruction>Leave now if the path is clear.</cap:instruction>
            <cap:expires>2026-01-10T20:30:00+10:30</cap:expires>
            <cap:area>
              <cap:areaDesc>Mount Barker &amp; surrounds</cap:areaDesc>
              <cap:polygon>-35.0,138.8 -35.0,138.9 -35.1,138.9 -35.1,138.8 -35.0,138.8</cap:polygon>
              <cap:circle>-35.07,138.86 5</cap:circle>
            </cap:area>
          </cap:info>
          <cap:info>
            <cap:event>Ignored second block</cap:event>
          </cap:info>
        </cap:alert>
        <cap:alert xmlns:cap="urn:oasis:names:tc:emergency:cap:1.2">
          <cap:sender>cfs.sa.gov.au</cap:sender>
          <cap:info><cap:event>No identifier</cap:event></cap:info>
        </cap:alert>
        <alert xmlns="urn:oasis:names:tc:emergency:cap:1.2">
          <identifier>CFS-2026-0043</identifier>
          <msgType>Cancel</msgType>
        </alert>
      </edxlde:embeddedXMLContent>
    </edxlde:xmlContent>
  </edxlde:contentObject>
</edxlde:EDXLDistribution>"#;

    #[test]
    fn test_parses_first_info_block_and_areas() {
        let alerts = parse_cap(SAMPLE).unwrap();
        assert_eq!(alerts.len(), 1);

        let alert = &alerts[0];
        assert_eq!(alert.identifier.as_deref(), Some("CFS-2026-0042"));
        assert_eq!(alert.msg_type.as_deref(), Some("Alert"));
        assert_eq!(alert.event.as_deref(), Some("Bushfire"));
        assert_eq!(alert.severity.as_deref(), Some("Severe"));
        assert_eq!(alert.sender_name.as_deref(), Some("SA Country Fire Service"));
        assert_eq!(
            alert.description.as_deref(),
            Some("A bushfire is burning near <b>Mount Barker</b>.")
        );
        assert_eq!(alert.areas.len(), 1);
        assert_eq!(
            alert.areas[0].area_desc.as_deref(),
            Some("Mount Barker & surrounds")
        );
        assert_eq!(alert.areas[0].polygons.len(), 1);
        assert_eq!(alert.areas[0].circles, vec!["-35.07,138.86 5".to_string()]);
    }

    #[test]
    fn test_skips_alerts_without_identifier_or_info() {
        let alerts = parse_cap(SAMPLE).unwrap();
        assert!(alerts.iter().all(|a| a.identifier.is_some()));
        assert!(
            alerts
                .iter()
                .all(|a| a.identifier.as_deref() != Some("CFS-2026-0043"))
        );
    }

    #[test]
    fn test_empty_feed_is_empty_snapshot() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"></feed>"#;
        assert!(parse_cap(xml).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_xml_is_payload_error() {
        assert!(matches!(
            parse_cap("<alert><identifier>x</alert>"),
            Err(FetchError::Payload(_))
        ));
        assert!(matches!(parse_cap(""), Err(FetchError::Payload(_))));
    }
}
