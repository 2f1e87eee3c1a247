//! HTTP session protocol: one request per connection, answered from the
//! reactor thread without blocking.
//!
//! Routes:
//!
//! ```text
//! GET|HEAD /rootDesc.xml   device description
//! GET      /status         JSON status
//! POST     /ctl/…          501 (control actions are not served)
//! anything else            404
//! ```

use std::sync::Arc;

use serde::Serialize;
use tokio::io::Ready;
use tokio::sync::watch;

use lanmedia_catalog::Catalog;
use lanmedia_core::RuntimeConfig;

use crate::paths::{ROOT_DESC_PATH, STATUS_PATH};
use crate::session::Session;
use crate::uptime::StartupClock;

/// Largest accepted request header section.
pub const MAX_HEADER_BYTES: usize = 8 * 1024;

const CONTROL_PREFIX: &str = "/ctl/";

/// Protocol collaborator invoked for each ready OPEN session. It alone
/// decides when a session becomes FINISHED.
pub trait SessionHandler {
    fn on_ready(&mut self, session: &mut Session, ready: Ready);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parse {
    Incomplete,
    Malformed,
    Complete(Request),
}

/// Parse the request line once the header section is complete.
pub fn parse_request(input: &[u8]) -> Parse {
    let Some(end) = input.windows(4).position(|w| w == b"\r\n\r\n") else {
        return Parse::Incomplete;
    };
    let Ok(head) = std::str::from_utf8(&input[..end]) else {
        return Parse::Malformed;
    };
    let request_line = head.lines().next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Parse::Malformed;
    };
    if !version.starts_with("HTTP/1.") {
        return Parse::Malformed;
    }
    let path = target.split('?').next().unwrap_or(target);
    Parse::Complete(Request {
        method: method.to_string(),
        path: path.to_string(),
    })
}

#[derive(Debug, Serialize)]
struct StatusPayload<'a> {
    friendly_name: &'a str,
    uuid: &'a str,
    update_id: u32,
    items: usize,
    uptime_secs: u64,
    started_at_unix: i64,
}

/// Default session handler: device description, status, and error replies.
#[derive(Debug)]
pub struct UpnpHttp {
    config: Arc<RuntimeConfig>,
    catalog: Arc<Catalog>,
    revision: watch::Receiver<u32>,
    clock: StartupClock,
}

impl UpnpHttp {
    pub fn new(
        config: Arc<RuntimeConfig>,
        catalog: Arc<Catalog>,
        revision: watch::Receiver<u32>,
        clock: StartupClock,
    ) -> Self {
        Self {
            config,
            catalog,
            revision,
            clock,
        }
    }

    /// Build the complete response for `request`.
    pub fn route(&self, request: &Request) -> Vec<u8> {
        let head = request.method == "HEAD";
        match (request.method.as_str(), request.path.as_str()) {
            ("GET" | "HEAD", ROOT_DESC_PATH) => response(
                200,
                Some("text/xml; charset=\"utf-8\""),
                self.root_description().as_bytes(),
                head,
            ),
            ("GET" | "HEAD", STATUS_PATH) => match self.status_json() {
                Ok(body) => response(200, Some("application/json"), &body, head),
                Err(err) => {
                    tracing::error!(error = %err, "failed to encode status");
                    response(500, None, b"", head)
                }
            },
            ("POST", path) if path.starts_with(CONTROL_PREFIX) => response(501, None, b"", false),
            _ => response(404, None, b"", head),
        }
    }

    fn status_json(&self) -> serde_json::Result<Vec<u8>> {
        let identity = &self.config.identity;
        serde_json::to_vec(&StatusPayload {
            friendly_name: &identity.friendly_name,
            uuid: &identity.uuid,
            update_id: *self.revision.borrow(),
            items: self.catalog.item_count(),
            uptime_secs: self.clock.uptime_secs(),
            started_at_unix: self.clock.started_at().timestamp(),
        })
    }

    pub fn root_description(&self) -> String {
        let identity = &self.config.identity;
        format!(
            "<?xml version=\"1.0\"?>\r\n\
             <root xmlns=\"urn:schemas-upnp-org:device-1-0\">\
             <specVersion><major>1</major><minor>0</minor></specVersion>\
             <device>\
             <deviceType>urn:schemas-upnp-org:device:MediaServer:1</deviceType>\
             <friendlyName>{}</friendlyName>\
             <manufacturer>lanmedia</manufacturer>\
             <modelDescription>lanmedia media server</modelDescription>\
             <modelName>lanmedia</modelName>\
             <modelNumber>{}</modelNumber>\
             <serialNumber>{}</serialNumber>\
             <UDN>{}</UDN>\
             <presentationURL>{}</presentationURL>\
             <serviceList>{}</serviceList>\
             </device>\
             </root>",
            xml_escape(&identity.friendly_name),
            xml_escape(&identity.model_number),
            xml_escape(&identity.serial),
            xml_escape(&identity.uuid),
            xml_escape(&self.config.presentation_url),
            SERVICES
                .iter()
                .map(|(ty, id, name)| service_xml(ty, id, name))
                .collect::<String>(),
        )
    }

    /// Write queued output; finish the session once it is all sent or the
    /// connection failed.
    fn flush(&self, session: &mut Session) {
        match session.flush_output() {
            Ok(true) => {
                session.finish();
            }
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(session = %session.id(), error = %err, "write failed");
                session.finish();
            }
        }
    }
}

impl SessionHandler for UpnpHttp {
    fn on_ready(&mut self, session: &mut Session, ready: Ready) {
        if session.has_pending_output() {
            if ready.is_writable() || ready.is_write_closed() {
                self.flush(session);
            }
            return;
        }

        let outcome = match session.read_available(MAX_HEADER_BYTES + 1) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(session = %session.id(), error = %err, "read failed");
                session.finish();
                return;
            }
        };

        let reply = match parse_request(session.input()) {
            Parse::Complete(request) => {
                tracing::debug!(
                    session = %session.id(),
                    method = %request.method,
                    path = %request.path,
                    "request",
                );
                self.route(&request)
            }
            Parse::Malformed => response(400, None, b"", false),
            Parse::Incomplete if session.input().len() > MAX_HEADER_BYTES => {
                response(400, None, b"", false)
            }
            Parse::Incomplete if outcome.eof => {
                session.finish();
                return;
            }
            Parse::Incomplete => return,
        };
        session.queue_response(reply);
        self.flush(session);
    }
}

const SERVICES: [(&str, &str, &str); 3] = [
    ("ContentDirectory", "ContentDirectory", "ContentDir"),
    ("ConnectionManager", "ConnectionManager", "ConnectionMgr"),
    ("X_MS_MediaReceiverRegistrar", "X_MS_MediaReceiverRegistrar", "X_MS_MediaReceiverRegistrar"),
];

fn service_xml(service_type: &str, service_id: &str, name: &str) -> String {
    let domain = if service_type.starts_with("X_MS") {
        "microsoft.com"
    } else {
        "upnp-org"
    };
    let urn_domain = if domain == "upnp-org" {
        "schemas-upnp-org"
    } else {
        domain
    };
    format!(
        "<service>\
         <serviceType>urn:{urn_domain}:service:{service_type}:1</serviceType>\
         <serviceId>urn:{domain}:serviceId:{service_id}</serviceId>\
         <controlURL>{CONTROL_PREFIX}{name}</controlURL>\
         <eventSubURL>/evt/{name}</eventSubURL>\
         <SCPDURL>/{name}.xml</SCPDURL>\
         </service>"
    )
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        501 => "Not Implemented",
        _ => "Internal Server Error",
    }
}

/// A full `Connection: close` response. `head` drops the body but keeps its
/// length.
pub fn response(status: u16, content_type: Option<&str>, body: &[u8], head: bool) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {status} {}\r\n", reason(status));
    if let Some(content_type) = content_type {
        out.push_str(&format!("Content-Type: {content_type}\r\n"));
    }
    out.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\nServer: lanmedia/{}\r\n\r\n",
        body.len(),
        env!("CARGO_PKG_VERSION")
    ));
    let mut bytes = out.into_bytes();
    if !head {
        bytes.extend_from_slice(body);
    }
    bytes
}

fn xml_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
