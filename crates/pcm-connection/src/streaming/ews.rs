//! Exchange Web Services streaming-notification transport.
//!
//! Subscribes to new-mail events on the inbox and holds a
//! `GetStreamingEvents` long-poll open. Notifications themselves are
//! discarded; only the session's lifetime matters to the monitor.

use super::{DisconnectCallback, StreamingOptions, StreamingTransport};
use async_trait::async_trait;
use futures_util::StreamExt;
use pcm_common::{Credentials, MonitorError, MonitorResult};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::header::CONTENT_TYPE;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufRead;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::io::StreamReader;
use tracing::{debug, trace};

const SOAP_CONTENT_TYPE: &str = "text/xml; charset=utf-8";
const SERVER_VERSION: &str = "Exchange2013_SP1";

/// EWS endpoint for a host name. Full URLs are used as given.
pub(crate) fn ews_endpoint(hostname: &str) -> String {
    if hostname.starts_with("https://") || hostname.starts_with("http://") {
        hostname.to_string()
    } else {
        format!("https://{}/EWS/Exchange.asmx", hostname)
    }
}

fn soap_envelope(body: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/""#,
            r#" xmlns:t="http://schemas.microsoft.com/exchange/services/2006/types""#,
            r#" xmlns:m="http://schemas.microsoft.com/exchange/services/2006/messages">"#,
            r#"<soap:Header><t:RequestServerVersion Version="{}" /></soap:Header>"#,
            r#"<soap:Body>{}</soap:Body>"#,
            r#"</soap:Envelope>"#
        ),
        SERVER_VERSION, body
    )
}

fn subscribe_request() -> String {
    soap_envelope(concat!(
        "<m:Subscribe><m:StreamingSubscriptionRequest>",
        r#"<t:FolderIds><t:DistinguishedFolderId Id="inbox" /></t:FolderIds>"#,
        "<t:EventTypes><t:EventType>NewMailEvent</t:EventType></t:EventTypes>",
        "</m:StreamingSubscriptionRequest></m:Subscribe>"
    ))
}

fn get_streaming_events_request(subscription_id: &str, connection_timeout_minutes: u64) -> String {
    soap_envelope(&format!(
        concat!(
            "<m:GetStreamingEvents>",
            "<m:SubscriptionIds><t:SubscriptionId>{}</t:SubscriptionId></m:SubscriptionIds>",
            "<m:ConnectionTimeout>{}</m:ConnectionTimeout>",
            "</m:GetStreamingEvents>"
        ),
        subscription_id, connection_timeout_minutes
    ))
}

/// Element whose text the scanner is collecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    MessageText,
    ResponseCode,
    FaultString,
    SubscriptionId,
    ConnectionStatus,
}

impl Field {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"MessageText" => Some(Field::MessageText),
            b"ResponseCode" => Some(Field::ResponseCode),
            b"faultstring" => Some(Field::FaultString),
            b"SubscriptionId" => Some(Field::SubscriptionId),
            b"ConnectionStatus" => Some(Field::ConnectionStatus),
            _ => None,
        }
    }
}

/// What one SOAP envelope reported.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct EnvelopeSummary {
    error_class: bool,
    message_text: Option<String>,
    response_code: Option<String>,
    fault_string: Option<String>,
    subscription_id: Option<String>,
    connection_status: Option<String>,
}

impl EnvelopeSummary {
    fn slot(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::MessageText => &mut self.message_text,
            Field::ResponseCode => &mut self.response_code,
            Field::FaultString => &mut self.fault_string,
            Field::SubscriptionId => &mut self.subscription_id,
            Field::ConnectionStatus => &mut self.connection_status,
        }
    }

    /// Error responses and SOAP faults become transport faults.
    fn into_result(self, name: &str) -> MonitorResult<Self> {
        if let Some(fault) = self.fault_string {
            return Err(MonitorError::transport(name, fault));
        }
        if self.error_class {
            let detail = self
                .message_text
                .or(self.response_code)
                .unwrap_or_else(|| "unknown EWS error".to_string());
            return Err(MonitorError::transport(name, detail));
        }
        Ok(self)
    }
}

/// Folds XML events into one summary per `Envelope`.
#[derive(Debug, Default)]
struct EnvelopeScanner {
    current: EnvelopeSummary,
    capturing: Option<Field>,
    depth: usize,
}

impl EnvelopeScanner {
    /// Returns the summary when an envelope closes.
    fn feed(&mut self, event: &Event<'_>) -> Result<Option<EnvelopeSummary>, quick_xml::Error> {
        match event {
            Event::Start(start) => {
                self.depth += 1;
                self.note_attributes(start)?;
                // First occurrence wins
                let field = Field::from_local_name(start.local_name().as_ref())
                    .filter(|f| self.current.slot(*f).is_none());
                self.capturing = field;
            }
            Event::Empty(start) => self.note_attributes(start)?,
            Event::Text(text) => {
                if let Some(field) = self.capturing {
                    let value = text.unescape()?;
                    self.current
                        .slot(field)
                        .get_or_insert_with(String::new)
                        .push_str(value.trim());
                }
            }
            Event::End(end) => {
                self.capturing = None;
                self.depth = self.depth.saturating_sub(1);
                if end.local_name().as_ref() == b"Envelope" {
                    self.depth = 0;
                    return Ok(Some(std::mem::take(&mut self.current)));
                }
            }
            _ => {}
        }
        Ok(None)
    }

    fn note_attributes(&mut self, start: &BytesStart<'_>) -> Result<(), quick_xml::Error> {
        for attr in start.attributes() {
            let attr = attr?;
            if attr.key.local_name().as_ref() == b"ResponseClass"
                && attr.unescape_value()?.as_ref() == "Error"
            {
                self.current.error_class = true;
            }
        }
        Ok(())
    }

    /// True while an envelope has been opened but not closed.
    fn in_envelope(&self) -> bool {
        self.depth > 0
    }
}

fn malformed(name: &str, error: quick_xml::Error) -> MonitorError {
    MonitorError::transport(name, format!("malformed EWS response: {}", error))
}

/// Parses a complete response body and returns its first envelope.
fn parse_response(name: &str, xml: &str) -> MonitorResult<EnvelopeSummary> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut scanner = EnvelopeScanner::default();

    loop {
        match reader.read_event().map_err(|e| malformed(name, e))? {
            Event::Eof => break,
            event => {
                if let Some(summary) = scanner.feed(&event).map_err(|e| malformed(name, e))? {
                    return summary.into_result(name);
                }
            }
        }
    }
    Err(MonitorError::transport(name, "response carried no SOAP envelope"))
}

/// Async reader over a streamed response body.
fn body_reader(response: reqwest::Response) -> impl AsyncBufRead + Unpin + Send {
    let chunks = response
        .bytes_stream()
        .map(|chunk| chunk.map_err(|e| io::Error::new(io::ErrorKind::Other, e)));
    StreamReader::new(Box::pin(chunks))
}

/// Reads the long-poll body until the server ends it.
///
/// `Ok(())` means the server closed the session normally. Silence longer
/// than `heartbeat_timeout` is a fault: the server sends status envelopes
/// while idle, so a quiet socket means the path to it is gone.
async fn consume_stream<R>(name: &str, body: R, heartbeat_timeout: Duration) -> MonitorResult<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut reader = Reader::from_reader(body);
    reader.trim_text(true);
    let mut scanner = EnvelopeScanner::default();
    let mut buf = Vec::new();

    loop {
        let event = timeout(heartbeat_timeout, reader.read_event_into_async(&mut buf))
            .await
            .map_err(|_| {
                MonitorError::timeout(name, format!("no data from stream for {:?}", heartbeat_timeout))
            })?
            .map_err(|e| MonitorError::transport(name, format!("stream interrupted: {}", e)))?;

        match event {
            Event::Eof if scanner.in_envelope() => {
                return Err(MonitorError::transport(name, "stream ended inside an envelope"));
            }
            Event::Eof => return Ok(()),
            event => {
                if let Some(summary) = scanner.feed(&event).map_err(|e| malformed(name, e))? {
                    let summary = summary.into_result(name)?;
                    match summary.connection_status.as_deref() {
                        Some("Closed") => debug!("{} server closed the streaming session", name),
                        Some(status) => trace!("{} connection status: {}", name, status),
                        None => trace!("{} notification received", name),
                    }
                }
            }
        }
        buf.clear();
    }
}

pub struct EwsStreamingTransport {
    client: reqwest::Client,
    endpoint: String,
    credentials: Credentials,
    options: StreamingOptions,
    subscription_id: Option<String>,
    open: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl EwsStreamingTransport {
    pub fn new(hostname: &str, credentials: Credentials, options: &StreamingOptions) -> MonitorResult<Self> {
        let endpoint = ews_endpoint(hostname);
        let client = reqwest::Client::builder()
            .connect_timeout(options.request_timeout)
            .build()
            .map_err(|e| MonitorError::transport(format!("exchange://{}", endpoint), e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            credentials,
            options: options.clone(),
            subscription_id: None,
            open: Arc::new(AtomicBool::new(false)),
            task: None,
        })
    }

    fn soap_request(&self, body: String) -> reqwest::RequestBuilder {
        self.client
            .post(&self.endpoint)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .header(CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .body(body)
    }

    fn stop_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.open.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl StreamingTransport for EwsStreamingTransport {
    fn name(&self) -> String {
        format!("exchange://{}", self.endpoint)
    }

    async fn subscribe(&mut self) -> MonitorResult<()> {
        let name = self.name();
        let response = self
            .soap_request(subscribe_request())
            .timeout(self.options.request_timeout)
            .send()
            .await
            .map_err(|e| MonitorError::transport(&name, format!("Subscribe failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MonitorError::transport(&name, format!("Subscribe failed: {}", e)))?;

        // EWS reports errors inside a 500 body, so parse before the status
        let summary = parse_response(&name, &body);
        if !status.is_success() {
            if let Err(fault) = summary {
                return Err(fault);
            }
            return Err(MonitorError::transport(&name, format!("Subscribe failed: HTTP {}", status)));
        }

        let id = summary?
            .subscription_id
            .ok_or_else(|| MonitorError::transport(&name, "Subscribe response carried no SubscriptionId"))?;
        debug!("{} subscribed to inbox notifications", name);
        self.subscription_id = Some(id);
        Ok(())
    }

    async fn open(&mut self, on_disconnect: DisconnectCallback) -> MonitorResult<()> {
        let name = self.name();
        let subscription_id = self
            .subscription_id
            .clone()
            .ok_or_else(|| MonitorError::transport(&name, "open requested before subscribe"))?;
        self.stop_task();

        let minutes = (self.options.session_lifetime.as_secs() / 60).max(1);
        let request = self
            .soap_request(get_streaming_events_request(&subscription_id, minutes))
            .send();

        // The body stays open for the whole session. The response head is
        // bounded here, the body by the heartbeat window.
        let response = timeout(self.options.request_timeout, request)
            .await
            .map_err(|_| MonitorError::timeout(&name, "GetStreamingEvents"))?
            .map_err(|e| MonitorError::transport(&name, format!("GetStreamingEvents failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MonitorError::transport(
                &name,
                format!("GetStreamingEvents failed: HTTP {}", status),
            ));
        }

        self.open.store(true, Ordering::SeqCst);
        let open = Arc::clone(&self.open);
        let heartbeat_timeout = self.options.heartbeat_timeout;
        self.task = Some(tokio::spawn(async move {
            let outcome = consume_stream(&name, body_reader(response), heartbeat_timeout).await;
            open.store(false, Ordering::SeqCst);
            on_disconnect(outcome.err());
        }));
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&mut self) {
        self.stop_task();
        self.subscription_id = None;
    }
}

impl Drop for EwsStreamingTransport {
    fn drop(&mut self) {
        self.stop_task();
    }
}
