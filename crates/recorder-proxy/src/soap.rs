//! SOAP 1.1 envelope generation and response parsing for the vendor services.

use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::events::{BytesDecl, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;
use uuid::Uuid;

use crate::error::VendorError;
use crate::model::{AuthIdentity, RemoteRecorder, ScheduleRequest, Session};
use crate::timing::parse_timestamp;

pub const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const OPERATION_NS: &str = "http://tempuri.org/";
pub const DATA_NS: &str = "http://schemas.datacontract.org/2004/07/Panopto.Server.Services.PublicAPI.V40";
pub const ARRAYS_NS: &str = "http://schemas.microsoft.com/2003/10/Serialization/Arrays";
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Value of the `SOAPAction` header for an operation on a service contract.
pub fn soap_action(contract: &str, operation: &str) -> String {
    format!("\"{}{}/{}\"", OPERATION_NS, contract, operation)
}

fn xml_err<E: std::fmt::Display>(err: E) -> VendorError {
    VendorError::Xml(err.to_string())
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Streams one request envelope. Data-contract members use the `a:` prefix,
/// serialized arrays the `b:` prefix.
struct EnvelopeWriter {
    writer: Writer<Cursor<Vec<u8>>>,
    operation: &'static str,
}

impl EnvelopeWriter {
    fn begin(operation: &'static str) -> Result<Self, VendorError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(xml_err)?;

        let mut envelope = BytesStart::new("s:Envelope");
        envelope.push_attribute(("xmlns:s", SOAP_ENV_NS));
        envelope.push_attribute(("xmlns:a", DATA_NS));
        envelope.push_attribute(("xmlns:b", ARRAYS_NS));
        envelope.push_attribute(("xmlns:i", XSI_NS));
        writer.write_event(Event::Start(envelope)).map_err(xml_err)?;
        writer
            .write_event(Event::Start(BytesStart::new("s:Body")))
            .map_err(xml_err)?;

        let mut op = BytesStart::new(operation);
        op.push_attribute(("xmlns", OPERATION_NS));
        writer.write_event(Event::Start(op)).map_err(xml_err)?;

        Ok(Self { writer, operation })
    }

    fn start(&mut self, name: &str) -> Result<(), VendorError> {
        self.writer
            .write_event(Event::Start(BytesStart::new(name)))
            .map_err(xml_err)
    }

    fn end(&mut self, name: &str) -> Result<(), VendorError> {
        self.writer
            .write_event(Event::End(BytesStart::new(name).to_end()))
            .map_err(xml_err)
    }

    fn element(&mut self, name: &str, value: &str) -> Result<(), VendorError> {
        self.start(name)?;
        self.writer
            .write_event(Event::Text(BytesText::new(value)))
            .map_err(xml_err)?;
        self.end(name)
    }

    fn nil(&mut self, name: &str) -> Result<(), VendorError> {
        let mut el = BytesStart::new(name);
        el.push_attribute(("i:nil", "true"));
        self.writer.write_event(Event::Empty(el)).map_err(xml_err)
    }

    fn auth(&mut self, identity: &AuthIdentity) -> Result<(), VendorError> {
        self.start("auth")?;
        self.nil("a:AuthCode")?;
        self.element("a:Password", &identity.password)?;
        self.element("a:UserKey", &identity.user_key)?;
        self.end("auth")
    }

    fn guid_array(&mut self, name: &str, ids: &[Uuid]) -> Result<(), VendorError> {
        self.start(name)?;
        for id in ids {
            self.element("b:guid", &id.to_string())?;
        }
        self.end(name)
    }

    fn finish(mut self) -> Result<String, VendorError> {
        self.end(self.operation)?;
        self.end("s:Body")?;
        self.end("s:Envelope")?;
        let bytes = self.writer.into_inner().into_inner();
        String::from_utf8(bytes).map_err(xml_err)
    }
}

pub fn log_on_with_password(user_key: &str, password: &str) -> Result<String, VendorError> {
    let mut env = EnvelopeWriter::begin("LogOnWithPassword")?;
    env.element("userKey", user_key)?;
    env.element("password", password)?;
    env.finish()
}

pub fn get_remote_recorders_by_id(auth: &AuthIdentity, ids: &[Uuid]) -> Result<String, VendorError> {
    let mut env = EnvelopeWriter::begin("GetRemoteRecordersById")?;
    env.auth(auth)?;
    env.guid_array("remoteRecorderIds", ids)?;
    env.finish()
}

pub fn get_sessions_by_id(auth: &AuthIdentity, ids: &[Uuid]) -> Result<String, VendorError> {
    let mut env = EnvelopeWriter::begin("GetSessionsById")?;
    env.auth(auth)?;
    env.guid_array("sessionIds", ids)?;
    env.finish()
}

pub fn update_recording_time(
    auth: &AuthIdentity,
    session_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<String, VendorError> {
    let mut env = EnvelopeWriter::begin("UpdateRecordingTime")?;
    env.auth(auth)?;
    env.element("sessionId", &session_id.to_string())?;
    env.element("start", &format_timestamp(&start))?;
    env.element("end", &format_timestamp(&end))?;
    env.finish()
}

pub fn schedule_recording(auth: &AuthIdentity, request: &ScheduleRequest) -> Result<String, VendorError> {
    let mut env = EnvelopeWriter::begin("ScheduleRecording")?;
    env.auth(auth)?;
    env.element("name", &request.name)?;
    env.element("folderId", &request.folder_id.to_string())?;
    env.element("isBroadcast", if request.is_broadcast { "true" } else { "false" })?;
    env.element("start", &format_timestamp(&request.start))?;
    env.element("end", &format_timestamp(&request.end))?;
    env.start("recorderSettings")?;
    env.start("a:RecorderSettings")?;
    env.element("a:RecorderId", &request.recorder_id.to_string())?;
    env.element("a:SuppressPrimary", "false")?;
    env.element("a:SuppressSecondary", "false")?;
    env.end("a:RecorderSettings")?;
    env.end("recorderSettings")?;
    env.finish()
}

/// Minimal element tree keyed by local names; namespace prefixes are dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlNode {
    pub name: String,
    pub text: String,
    pub nil: bool,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    fn from_start(e: &BytesStart<'_>) -> Self {
        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
        let nil = e.attributes().flatten().any(|attr| {
            attr.key.local_name().as_ref() == b"nil" && attr.value.as_ref() == b"true"
        });
        Self {
            name,
            nil,
            ..Default::default()
        }
    }

    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Depth-first search for the first element with this local name.
    pub fn descendant(&self, name: &str) -> Option<&XmlNode> {
        for c in &self.children {
            if c.name == name {
                return Some(c);
            }
            if let Some(found) = c.descendant(name) {
                return Some(found);
            }
        }
        None
    }

    /// Text of a direct child, `None` when the child is absent, nil or empty.
    pub fn text_of(&self, name: &str) -> Option<&str> {
        self.child(name)
            .filter(|c| !c.nil && !c.text.is_empty())
            .map(|c| c.text.as_str())
    }
}

pub fn parse_document(xml: &str) -> Result<XmlNode, VendorError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack = vec![XmlNode {
        name: "#document".into(),
        ..Default::default()
    }];

    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) => stack.push(XmlNode::from_start(&e)),
            Event::Empty(e) => {
                let node = XmlNode::from_start(&e);
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(node);
                }
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(xml_err)?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => {
                if stack.len() < 2 {
                    return Err(VendorError::Xml("unbalanced end tag".into()));
                }
                if let Some(node) = stack.pop() {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(node);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if stack.len() != 1 {
        return Err(VendorError::Xml("unexpected end of document".into()));
    }
    stack.pop().ok_or_else(|| VendorError::Xml("empty document".into()))
}

/// Parses a response envelope and returns its `Body`, or the fault it carries.
pub fn response_body(xml: &str) -> Result<XmlNode, VendorError> {
    let doc = parse_document(xml)?;
    let body = doc
        .descendant("Body")
        .ok_or(VendorError::MissingElement("Body"))?;

    if let Some(fault) = body.descendant("Fault") {
        let code = fault
            .text_of("faultcode")
            .or_else(|| fault.child("Code").and_then(|c| c.text_of("Value")))
            .unwrap_or("unknown")
            .to_string();
        let message = fault
            .text_of("faultstring")
            .or_else(|| fault.child("Reason").and_then(|r| r.text_of("Text")))
            .unwrap_or("")
            .to_string();
        return Err(VendorError::Fault { code, message });
    }

    Ok(body.clone())
}

fn parse_uuid(node: &XmlNode, name: &'static str) -> Result<Uuid, VendorError> {
    let text = node.text_of(name).ok_or(VendorError::MissingElement(name))?;
    Uuid::parse_str(text).map_err(|e| VendorError::Xml(format!("<{}>: {}", name, e)))
}

fn guid_list(node: Option<&XmlNode>) -> Vec<Uuid> {
    node.map(|n| {
        n.children_named("guid")
            .filter_map(|g| Uuid::parse_str(g.text.trim()).ok())
            .collect()
    })
    .unwrap_or_default()
}

pub fn parse_login_result(body: &XmlNode) -> Result<bool, VendorError> {
    let result = body
        .descendant("LogOnWithPasswordResult")
        .ok_or(VendorError::MissingElement("LogOnWithPasswordResult"))?;
    Ok(result.text.trim().eq_ignore_ascii_case("true"))
}

pub fn parse_session(node: &XmlNode) -> Result<Session, VendorError> {
    let start_time = match node.text_of("StartTime") {
        Some(raw) => Some(parse_timestamp(raw).ok_or_else(|| VendorError::Timestamp(raw.to_string()))?),
        None => None,
    };
    let duration = node.text_of("Duration").and_then(|d| d.trim().parse::<f64>().ok());
    let folder_id = node.text_of("FolderId").and_then(|f| Uuid::parse_str(f).ok());

    Ok(Session {
        id: parse_uuid(node, "Id")?,
        name: node.text_of("Name").unwrap_or_default().to_string(),
        start_time,
        duration,
        folder_id,
        state: node.text_of("State").map(str::to_string),
    })
}

pub fn parse_sessions(body: &XmlNode) -> Result<Vec<Session>, VendorError> {
    let result = body
        .descendant("GetSessionsByIdResult")
        .ok_or(VendorError::MissingElement("GetSessionsByIdResult"))?;
    result
        .children_named("Session")
        .filter(|s| !s.nil)
        .map(parse_session)
        .collect()
}

pub fn parse_remote_recorder(node: &XmlNode) -> Result<RemoteRecorder, VendorError> {
    Ok(RemoteRecorder {
        id: parse_uuid(node, "Id")?,
        name: node.text_of("Name").unwrap_or_default().to_string(),
        state: node.text_of("State").unwrap_or("Unknown").to_string(),
        scheduled_recordings: guid_list(node.child("ScheduledRecordings")),
    })
}

pub fn parse_remote_recorders(body: &XmlNode) -> Result<Vec<RemoteRecorder>, VendorError> {
    let result = body
        .descendant("GetRemoteRecordersByIdResult")
        .ok_or(VendorError::MissingElement("GetRemoteRecordersByIdResult"))?;
    result
        .children_named("RemoteRecorder")
        .filter(|r| !r.nil)
        .map(parse_remote_recorder)
        .collect()
}

/// Session ids created by `ScheduleRecording`, in vendor order.
pub fn parse_schedule_result(body: &XmlNode) -> Result<Vec<Uuid>, VendorError> {
    let result = body
        .descendant("ScheduleRecordingResult")
        .ok_or(VendorError::MissingElement("ScheduleRecordingResult"))?;
    Ok(guid_list(result.child("SessionIDs")))
}

/// `true` when `UpdateRecordingTime` reported conflicting sessions.
pub fn parse_update_conflicts(body: &XmlNode) -> bool {
    body.descendant("UpdateRecordingTimeResult")
        .and_then(|r| r.text_of("ConflictsExist"))
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
