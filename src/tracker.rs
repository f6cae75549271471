use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::aggregate::{dedup_courses, Aggregate, Aggregator};
use crate::client::RecordsClient;
use crate::error::TrackerError;
use crate::models::{AttendanceRecord, Course, GpaHistoryPoint, GpaRecord};
use crate::terms::{TermSelection, TermTimeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchKind {
    TermCodes,
    CurrentGpa,
    PreviousGpa,
    Courses,
    Attendance,
    TermGpa,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchFailure {
    pub kind: FetchKind,
    pub crn: Option<String>,
    pub message: String,
}

impl FetchFailure {
    fn new(kind: FetchKind, crn: Option<&str>, error: &TrackerError) -> Self {
        warn!(?kind, crn, %error, "fetch failed, continuing with partial data");
        Self {
            kind,
            crn: crn.map(str::to_string),
            message: error.to_string(),
        }
    }
}

/// Everything one load produced for one term selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub generation: u64,
    pub batch_id: Uuid,
    pub selection: TermSelection,
    pub current_gpa_record: GpaRecord,
    pub previous_gpa_record: Option<GpaRecord>,
    pub aggregate: Aggregate,
    pub failures: Vec<FetchFailure>,
}

impl Snapshot {
    pub fn has_partial_failure(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn has_failed(&self, kind: FetchKind) -> bool {
        self.failures.iter().any(|failure| failure.kind == kind)
    }
}

/// A term selection stamped with the generation it was issued under.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadTicket {
    pub generation: u64,
    pub selection: TermSelection,
}

/// Tracks the selected term. Each new selection bumps the generation;
/// snapshots from older generations are discarded on arrival.
#[derive(Debug)]
pub struct Session {
    timeline: TermTimeline,
    generation: u64,
    latest: Option<Snapshot>,
}

impl Session {
    pub fn new(timeline: TermTimeline) -> Self {
        Self {
            timeline,
            generation: 0,
            latest: None,
        }
    }

    pub fn timeline(&self) -> &TermTimeline {
        &self.timeline
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn select_latest(&mut self) -> Option<LoadTicket> {
        let selection = self.timeline.latest()?;
        Some(self.issue(selection))
    }

    pub fn select(&mut self, term_code: &str) -> Option<LoadTicket> {
        let selection = self.timeline.select(term_code)?;
        Some(self.issue(selection))
    }

    fn issue(&mut self, selection: TermSelection) -> LoadTicket {
        self.generation += 1;
        LoadTicket {
            generation: self.generation,
            selection,
        }
    }

    /// Returns `false`, dropping the snapshot, when a newer selection exists.
    pub fn accept(&mut self, snapshot: Snapshot) -> bool {
        let current = self.generation();
        if snapshot.generation != current {
            warn!(
                stale = snapshot.generation,
                current,
                term = %snapshot.selection.current.term_code,
                "discarding stale snapshot"
            );
            return false;
        }
        self.latest = Some(snapshot);
        true
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.latest.as_ref()
    }
}

#[derive(Clone)]
pub struct Tracker {
    client: RecordsClient,
    aggregator: Aggregator,
    excluded_term_codes: Vec<String>,
    attendance_concurrency: Option<usize>,
}

impl Tracker {
    pub fn new(
        client: RecordsClient,
        aggregator: Aggregator,
        excluded_term_codes: Vec<String>,
        attendance_concurrency: Option<usize>,
    ) -> Self {
        Self {
            client,
            aggregator,
            excluded_term_codes,
            attendance_concurrency,
        }
    }

    pub fn client(&self) -> &RecordsClient {
        &self.client
    }

    /// An unreachable term list resolves to an empty timeline plus the failure.
    pub async fn timeline(&self) -> (TermTimeline, Option<FetchFailure>) {
        match self.client.fetch_term_codes().await {
            Ok(raw) => (TermTimeline::new(raw, &self.excluded_term_codes), None),
            Err(error) => (
                TermTimeline::default(),
                Some(FetchFailure::new(FetchKind::TermCodes, None, &error)),
            ),
        }
    }

    #[instrument(
        skip(self, ticket),
        fields(generation = ticket.generation, term = %ticket.selection.current.term_code)
    )]
    pub async fn load(&self, ticket: LoadTicket) -> Snapshot {
        let batch_id = Uuid::new_v4();
        let LoadTicket {
            generation,
            selection,
        } = ticket;
        let current = &selection.current;
        let mut failures = Vec::new();

        let previous_gpa = async {
            match &selection.previous {
                Some(previous) => Some(
                    self.client
                        .fetch_gpa(&previous.term_code, &previous.banner_id)
                        .await,
                ),
                None => None,
            }
        };

        let (current_gpa, previous_gpa, courses) = tokio::join!(
            self.client.fetch_gpa(&current.term_code, &current.banner_id),
            previous_gpa,
            self.client.fetch_courses(&current.term_code),
        );

        let current_gpa_record = current_gpa.unwrap_or_else(|error| {
            failures.push(FetchFailure::new(FetchKind::CurrentGpa, None, &error));
            GpaRecord::default()
        });
        let previous_gpa_record = previous_gpa.map(|result| {
            result.unwrap_or_else(|error| {
                failures.push(FetchFailure::new(FetchKind::PreviousGpa, None, &error));
                GpaRecord::default()
            })
        });
        let courses = dedup_courses(courses.unwrap_or_else(|error| {
            failures.push(FetchFailure::new(FetchKind::Courses, None, &error));
            Vec::new()
        }));

        let attendance = self
            .fetch_all_attendance(&current.term_code, &current.banner_id, &courses)
            .await;
        let mut records = Vec::with_capacity(attendance.len());
        for (crn, result) in attendance {
            match result {
                Ok(record) => records.push(record),
                Err(error) => {
                    failures.push(FetchFailure::new(FetchKind::Attendance, Some(&crn), &error));
                    records.push(AttendanceRecord {
                        crn,
                        attendance_percentage: None,
                    });
                }
            }
        }

        let aggregate = self.aggregator.aggregate(
            &courses,
            &records,
            &current_gpa_record,
            previous_gpa_record.as_ref(),
        );

        info!(
            %batch_id,
            courses = aggregate.rows.len(),
            failures = failures.len(),
            "term snapshot loaded"
        );

        Snapshot {
            generation,
            batch_id,
            selection,
            current_gpa_record,
            previous_gpa_record,
            aggregate,
            failures,
        }
    }

    /// Waits for every course; results keep course order.
    async fn fetch_all_attendance(
        &self,
        term_code: &str,
        banner_id: &str,
        courses: &[Course],
    ) -> Vec<(String, Result<AttendanceRecord, TrackerError>)> {
        let crns: Vec<String> = courses.iter().map(|course| course.crn.clone()).collect();
        let requests = crns.into_iter().map(|crn| {
            let client = self.client.clone();
            let term_code = term_code.to_string();
            let banner_id = banner_id.to_string();
            async move {
                let result = client.fetch_attendance(&term_code, &banner_id, &crn).await;
                (crn, result)
            }
        });

        match self.attendance_concurrency {
            Some(limit) => stream::iter(requests).buffered(limit.max(1)).collect().await,
            None => futures::future::join_all(requests).await,
        }
    }

    /// Term GPA for every term in the timeline, oldest first.
    pub async fn gpa_history(
        &self,
        timeline: &TermTimeline,
    ) -> (Vec<GpaHistoryPoint>, Vec<FetchFailure>) {
        let requests = timeline.terms().iter().map(|term| async move {
            let result = self.client.fetch_gpa(&term.term_code, &term.banner_id).await;
            (term, result)
        });
        let results = futures::future::join_all(requests).await;

        let mut failures = Vec::new();
        let points = results
            .into_iter()
            .map(|(term, result)| {
                let term_gpa = match result {
                    Ok(record) => record.term_gpa,
                    Err(error) => {
                        failures.push(FetchFailure::new(FetchKind::TermGpa, None, &error));
                        None
                    }
                };
                GpaHistoryPoint {
                    term_code: term.term_code.clone(),
                    term: term.label().to_string(),
                    term_gpa,
                }
            })
            .collect();
        (points, failures)
    }
}
