use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::TrackerError;
use crate::models::{
    AcademicPerformance, AttendanceBody, AttendanceRecord, Course, CoursesBody, GpaRecord,
    SectionAttendance, Term, TermCodesBody,
};

const TERM_CODES_PATH: &str = "Get-Student-Term-codes";
const GPA_PATH: &str = "Get-StudentGPA";
const COURSES_PATH: &str = "Get-StudentDetails";
const ATTENDANCE_PATH: &str = "Get-StudentAttendance";
const SECTION_PATH: &str = "get-section-details";
const PERFORMANCE_PATH: &str = "get-academic-performance";
const TERM_INFO_PATH: &str = "get-term-information";
const LATEST_TERM_INFO_PATH: &str = "get-latest-term-information";

#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub status_text: String,
    pub body: Vec<u8>,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Authenticated GET against the session-scoped records API.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<HttpReply, TrackerError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: reqwest::Url,
}

impl HttpTransport {
    pub fn new(
        base_url: &str,
        api_token: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, TrackerError> {
        let mut base_url = reqwest::Url::parse(base_url)
            .map_err(|e| TrackerError::Config(format!("invalid base url: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = api_token.filter(|t| !t.trim().is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                .map_err(|e| TrackerError::Config(format!("invalid api token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| TrackerError::Config(format!("http client: {e}")))?;

        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<HttpReply, TrackerError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| TrackerError::Transport(format!("invalid request path {path}: {e}")))?;

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| TrackerError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| TrackerError::Transport(e.to_string()))?;

        Ok(HttpReply {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            body: body.to_vec(),
        })
    }
}

/// Metric fetchers for one student session, identified by its card id.
#[derive(Clone)]
pub struct RecordsClient {
    transport: Arc<dyn Transport>,
    card_id: String,
}

impl RecordsClient {
    pub fn new(transport: Arc<dyn Transport>, card_id: impl Into<String>) -> Self {
        Self {
            transport,
            card_id: card_id.into(),
        }
    }

    #[instrument(skip(self))]
    pub async fn fetch_term_codes(&self) -> Result<Vec<Term>, TrackerError> {
        require(&[("cardId", self.card_id.as_str())])?;
        let body: TermCodesBody = self
            .request(
                "fetch student term codes",
                TERM_CODES_PATH,
                &[("cardId", self.card_id.as_str())],
            )
            .await?;
        Ok(body.into_terms())
    }

    #[instrument(skip(self))]
    pub async fn fetch_gpa(
        &self,
        term_code: &str,
        banner_id: &str,
    ) -> Result<GpaRecord, TrackerError> {
        require(&[
            ("termCode", term_code),
            ("bannerId", banner_id),
            ("cardId", self.card_id.as_str()),
        ])?;
        self.request(
            "fetch student GPA",
            GPA_PATH,
            &[
                ("cardId", self.card_id.as_str()),
                ("term", term_code),
                ("id", banner_id),
            ],
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn fetch_courses(&self, term_code: &str) -> Result<Vec<Course>, TrackerError> {
        require(&[("termCode", term_code), ("cardId", self.card_id.as_str())])?;
        let body: CoursesBody = self
            .request(
                "fetch student details",
                COURSES_PATH,
                &[("cardId", self.card_id.as_str()), ("termCode", term_code)],
            )
            .await?;
        Ok(body.into_courses())
    }

    #[instrument(skip(self))]
    pub async fn fetch_attendance(
        &self,
        term_code: &str,
        banner_id: &str,
        crn: &str,
    ) -> Result<AttendanceRecord, TrackerError> {
        require(&[
            ("termCode", term_code),
            ("bannerId", banner_id),
            ("crn", crn),
            ("cardId", self.card_id.as_str()),
        ])?;
        let body: AttendanceBody = self
            .request(
                "fetch student attendance",
                ATTENDANCE_PATH,
                &[
                    ("cardId", self.card_id.as_str()),
                    ("term", term_code),
                    ("id", banner_id),
                    ("crn", crn),
                ],
            )
            .await?;

        let attendance_percentage = match body.attendance_percentage {
            Some(pct) if !pct.is_finite() || !(0.0..=100.0).contains(&pct) => {
                return Err(TrackerError::response(
                    200,
                    format!("attendance percentage {pct} for {crn} is outside 0..=100"),
                ));
            }
            other => other,
        };

        Ok(AttendanceRecord {
            crn: crn.to_string(),
            attendance_percentage,
        })
    }

    #[instrument(skip(self))]
    pub async fn fetch_section_attendance(
        &self,
        term_code: &str,
        banner_id: &str,
        section_id: &str,
    ) -> Result<SectionAttendance, TrackerError> {
        require(&[
            ("termCode", term_code),
            ("sectionId", section_id),
            ("bannerId", banner_id),
            ("cardId", self.card_id.as_str()),
        ])?;
        let mut section: SectionAttendance = self
            .request(
                "fetch section attendance",
                SECTION_PATH,
                &[
                    ("cardId", self.card_id.as_str()),
                    ("termCode", term_code),
                    ("bannerId", banner_id),
                    ("sectionId", section_id),
                ],
            )
            .await?;
        if section.section_id.is_empty() {
            section.section_id = section_id.to_string();
        }
        Ok(section)
    }

    #[instrument(skip(self))]
    pub async fn fetch_academic_performance(
        &self,
        term_code: &str,
        crn: &str,
        banner_id: &str,
    ) -> Result<AcademicPerformance, TrackerError> {
        require(&[
            ("termCode", term_code),
            ("crn", crn),
            ("bannerId", banner_id),
            ("cardId", self.card_id.as_str()),
        ])?;
        self.request(
            "fetch academic performance",
            PERFORMANCE_PATH,
            &[
                ("cardId", self.card_id.as_str()),
                ("termCode", term_code),
                ("crn", crn),
                ("bannerId", banner_id),
            ],
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn fetch_term_information(&self, term_code: &str) -> Result<Value, TrackerError> {
        require(&[("termCode", term_code), ("cardId", self.card_id.as_str())])?;
        self.request(
            "fetch term information",
            TERM_INFO_PATH,
            &[("cardId", self.card_id.as_str()), ("termCode", term_code)],
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn fetch_latest_term_information(&self) -> Result<Value, TrackerError> {
        require(&[("cardId", self.card_id.as_str())])?;
        self.request(
            "fetch latest term information",
            LATEST_TERM_INFO_PATH,
            &[("cardId", self.card_id.as_str())],
        )
        .await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, TrackerError> {
        debug!(path, "records request");
        let reply = self.transport.get(path, query).await?;
        decode(operation, &reply)
    }
}

/// Fails without touching the network when any identifier is blank.
pub fn require(fields: &[(&'static str, &str)]) -> Result<(), TrackerError> {
    let missing: Vec<&'static str> = fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(TrackerError::Validation { missing })
    }
}

/// Non-2xx replies report the body's `message`, then the status text, then
/// a generic "<operation> failed".
pub fn decode<T: DeserializeOwned>(operation: &str, reply: &HttpReply) -> Result<T, TrackerError> {
    let parsed: Result<Value, _> = serde_json::from_slice(&reply.body);

    if !reply.is_success() {
        let message = parsed
            .ok()
            .and_then(|body| body.get("message").and_then(Value::as_str).map(str::to_string))
            .filter(|m| !m.trim().is_empty())
            .or_else(|| Some(reply.status_text.clone()).filter(|s| !s.trim().is_empty()))
            .unwrap_or_else(|| format!("{operation} failed"));
        return Err(TrackerError::response(reply.status, message));
    }

    let value = parsed.map_err(|e| {
        TrackerError::response(reply.status, format!("{operation}: invalid JSON body: {e}"))
    })?;
    serde_json::from_value(value).map_err(|e| {
        TrackerError::response(reply.status, format!("{operation}: unexpected response shape: {e}"))
    })
}


#[cfg(test)]
mod tests {
    use super::fake::FakeTransport;
    use super::*;
    use serde_json::json;

    fn client() -> (Arc<FakeTransport>, RecordsClient) {
        let transport = Arc::new(FakeTransport::default());
        let client = RecordsClient::new(transport.clone(), "card-1");
        (transport, client)
    }

    #[tokio::test]
    async fn term_codes_unwrap_term_code_details() {
        let (transport, client) = client();
        transport.json(
            TERM_CODES_PATH,
            &[("cardId", "card-1")],
            json!({ "termCodeDetails": [
                { "termCode": "202590", "term": "Fall 2025", "bannerId": "A001" },
                { "termCode": "202610", "term": "Spring 2026", "bannerId": "A001" }
            ]}),
        );

        let terms = client.fetch_term_codes().await.unwrap();
        assert_eq!(terms.len(), 2);
        assert_eq!(terms[1].term, "Spring 2026");
    }

    #[tokio::test]
    async fn missing_identifiers_fail_before_any_request() {
        let (transport, client) = client();

        let err = client.fetch_gpa("", " ").await.unwrap_err();
        assert_eq!(
            err,
            TrackerError::Validation {
                missing: vec!["termCode", "bannerId"]
            }
        );

        let err = client.fetch_attendance("202610", "A001", "").await.unwrap_err();
        assert_eq!(err.to_string(), "Missing required fields: crn");
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_card_id_is_a_validation_error() {
        let transport = Arc::new(FakeTransport::default());
        let client = RecordsClient::new(transport.clone(), "");
        let err = client.fetch_term_codes().await.unwrap_err();
        assert_eq!(err.to_string(), "Missing required fields: cardId");
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn gpa_uses_term_and_id_query_names() {
        let (transport, client) = client();
        transport.json(
            GPA_PATH,
            &[("cardId", "card-1"), ("term", "202610"), ("id", "A001")],
            json!({ "termGpa": 3.6, "cumulativeGpa": 3.42 }),
        );
        let gpa = client.fetch_gpa("202610", "A001").await.unwrap();
        assert_eq!(gpa.term_gpa, Some(3.6));
        assert_eq!(gpa.cumulative_gpa, Some(3.42));
    }

    #[tokio::test]
    async fn error_message_prefers_body_message() {
        let (transport, client) = client();
        transport.reply(
            COURSES_PATH,
            &[("cardId", "card-1"), ("termCode", "202610")],
            500,
            "Internal Server Error",
            br#"{"message":"Ethos unavailable"}"#.to_vec(),
        );
        let err = client.fetch_courses("202610").await.unwrap_err();
        assert_eq!(err, TrackerError::response(500, "Ethos unavailable"));
    }

    #[tokio::test]
    async fn error_message_falls_back_to_status_text() {
        let (transport, client) = client();
        transport.reply(
            COURSES_PATH,
            &[("cardId", "card-1"), ("termCode", "202610")],
            503,
            "Service Unavailable",
            b"<html>down</html>".to_vec(),
        );
        let err = client.fetch_courses("202610").await.unwrap_err();
        assert_eq!(err.to_string(), "Service Unavailable");
    }

    #[tokio::test]
    async fn error_message_falls_back_to_operation() {
        let (transport, client) = client();
        let query = [("cardId", "card-1"), ("term", "202610"), ("id", "A001")];
        transport.reply(GPA_PATH, &query, 502, "", Vec::new());
        let err = client.fetch_gpa("202610", "A001").await.unwrap_err();
        assert_eq!(err.to_string(), "fetch student GPA failed");
    }

    #[tokio::test]
    async fn unparsable_success_body_is_a_response_error() {
        let (transport, client) = client();
        transport.reply(
            COURSES_PATH,
            &[("cardId", "card-1"), ("termCode", "202610")],
            200,
            "OK",
            b"not json".to_vec(),
        );
        let err = client.fetch_courses("202610").await.unwrap_err();
        assert!(matches!(err, TrackerError::Response { status: 200, .. }));
    }

    #[tokio::test]
    async fn transport_failures_pass_through() {
        let (transport, client) = client();
        transport.fail(
            TERM_CODES_PATH,
            &[("cardId", "card-1")],
            TrackerError::Transport("connection refused".to_string()),
        );
        let err = client.fetch_term_codes().await.unwrap_err();
        assert!(matches!(err, TrackerError::Transport(_)));
    }

    #[tokio::test]
    async fn attendance_null_is_not_zero() {
        let (transport, client) = client();
        let query = [("cardId", "card-1"), ("term", "202610"), ("id", "A001"), ("crn", "CS301")];
        transport.json(ATTENDANCE_PATH, &query, json!({ "attendancePercentage": null }));
        let record = client.fetch_attendance("202610", "A001", "CS301").await.unwrap();
        assert_eq!(record.crn, "CS301");
        assert_eq!(record.attendance_percentage, None);
    }

    #[tokio::test]
    async fn attendance_out_of_range_is_rejected() {
        let (transport, client) = client();
        let query = [("cardId", "card-1"), ("term", "202610"), ("id", "A001"), ("crn", "CS301")];
        transport.json(ATTENDANCE_PATH, &query, json!({ "attendancePercentage": 140 }));
        assert!(client.fetch_attendance("202610", "A001", "CS301").await.is_err());
    }

    #[tokio::test]
    async fn section_attendance_defaults_section_id() {
        let (transport, client) = client();
        transport.json(
            SECTION_PATH,
            &[
                ("cardId", "card-1"),
                ("termCode", "202610"),
                ("bannerId", "A001"),
                ("sectionId", "SEC-9"),
            ],
            json!({ "attendancePercentage": 72.5, "courseTitle": "Databases" }),
        );
        let section = client
            .fetch_section_attendance("202610", "A001", "SEC-9")
            .await
            .unwrap();
        assert_eq!(section.section_id, "SEC-9");
        assert_eq!(section.title.as_deref(), Some("Databases"));
    }

    #[tokio::test]
    async fn academic_performance_requires_all_identifiers() {
        let (_, client) = client();
        let err = client
            .fetch_academic_performance("", "", "A001")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing required fields: termCode, crn");
    }

    #[test]
    fn http_transport_rejects_bad_base_url() {
        assert!(HttpTransport::new("not a url", None, Duration::from_secs(1)).is_err());
        let transport =
            HttpTransport::new("https://records.example.edu/api", Some("t"), Duration::from_secs(1))
                .unwrap();
        assert_eq!(transport.base_url.as_str(), "https://records.example.edu/api/");
    }
}
