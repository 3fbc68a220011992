//! Live fixed-win prices from the bookmaker's GraphQL API.
//!
//! Two persisted queries: the day's meeting list, then one event query per open race.
//! Response handling works on `serde_json::Value` so only the fields read here need to
//! stay stable.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, NaiveDateTime, NaiveTime, TimeZone, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::parser::schema::Species;

const GRAPHQL_URL: &str = "https://rsa.unibet.com.au/api/v1/graphql";
const MEETINGS_QUERY: &str = "LobbyMeetingListQuery";
const MEETINGS_QUERY_HASH: &str = "31a97bd747dd4642dcc2584990eca46a52eb09fc7640d4f47e222df7af3a928d";
const EVENT_QUERY: &str = "EventQuery";
const EVENT_QUERY_HASH: &str = "4bfddf8b89e49c155f42a1ce45ea8f41ef75704762e82dfc23e4162aaa3f9ed1";
const CLIENT_COUNTRY: &str = "AU";
const MEETING_COUNTRIES: &[&str] = &["AUS", "NZL"];
const VACANT_BOX: &str = "Vacant Box";

const CONCURRENCY: usize = 5;
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;

pub const ODDS_COLUMNS: &[&str] = &[
    "Meeting", "Race", "Time", "Distance", "Runner", "Rug", "Box", "Price",
];

// ── Request payloads ──

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphQlRequest<V> {
    operation_name: &'static str,
    variables: V,
    extensions: Extensions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Extensions {
    persisted_query: PersistedQuery,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PersistedQuery {
    version: u32,
    sha256_hash: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MeetingListVariables {
    country_codes: Vec<String>,
    client_country_code: &'static str,
    start_date_time: String,
    end_date_time: String,
    virtual_start_date_time: String,
    virtual_end_date_time: String,
    is_rendering_virtual: bool,
    #[serde(rename = "fetchTRC")]
    fetch_trc: bool,
    race_types: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventVariables {
    client_country_code: &'static str,
    event_key: String,
    #[serde(rename = "fetchTRC")]
    fetch_trc: bool,
}

impl<V> GraphQlRequest<V> {
    fn persisted(operation_name: &'static str, sha256_hash: &'static str, variables: V) -> Self {
        GraphQlRequest {
            operation_name,
            variables,
            extensions: Extensions {
                persisted_query: PersistedQuery {
                    version: 1,
                    sha256_hash,
                },
            },
        }
    }
}

/// API race-type code for a species.
pub fn race_type(species: Species) -> &'static str {
    match species {
        Species::Greyhound => "G",
        Species::Horse => "T",
    }
}

/// Start and end of the local calendar day containing `now`, as UTC timestamps.
fn day_window(now: DateTime<Local>) -> (String, String) {
    let start = now.date_naive().and_time(NaiveTime::MIN);
    let end = start + chrono::Duration::days(1) - chrono::Duration::seconds(1);
    let to_utc = |n: NaiveDateTime| {
        Local
            .from_local_datetime(&n)
            .earliest()
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|| n.and_utc())
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string()
    };
    (to_utc(start), to_utc(end))
}

// ── Response handling ──

#[derive(Debug, Clone, PartialEq)]
pub struct OpenEvent {
    pub meeting: String,
    pub event_key: String,
    pub race: i64,
    pub distance: Option<i64>,
    pub advertised: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OddsRow {
    pub meeting: String,
    pub race: i64,
    pub time: String,
    pub distance: Option<i64>,
    pub runner: String,
    pub rug: Option<i64>,
    pub box_number: i64,
    pub price: f64,
}

impl OddsRow {
    pub fn cells(&self) -> Vec<String> {
        vec![
            self.meeting.clone(),
            self.race.to_string(),
            self.time.clone(),
            self.distance.map(|d| d.to_string()).unwrap_or_default(),
            self.runner.clone(),
            self.rug.map(|r| r.to_string()).unwrap_or_default(),
            self.box_number.to_string(),
            format!("{:.2}", self.price),
        ]
    }
}

/// Open races at AUS/NZL meetings of the given race type.
pub fn open_events(meetings: &Value, race_type: &str) -> Vec<OpenEvent> {
    let Some(meetings) = meetings["data"]["viewer"]["meetings"].as_array() else {
        return Vec::new();
    };

    meetings
        .iter()
        .filter(|m| {
            m["countryCode"]
                .as_str()
                .is_some_and(|c| MEETING_COUNTRIES.contains(&c))
                && m["raceType"].as_str() == Some(race_type)
        })
        .flat_map(|m| {
            let meeting = m["name"].as_str().unwrap_or_default().to_string();
            m["events"]
                .as_array()
                .into_iter()
                .flatten()
                .filter(|e| e["status"].as_str() == Some("Open"))
                .filter_map(move |e| {
                    Some(OpenEvent {
                        meeting: meeting.clone(),
                        event_key: e["eventKey"].as_str()?.to_string(),
                        race: e["sequence"].as_i64().unwrap_or_default(),
                        distance: e["distanceMetres"].as_i64(),
                        advertised: e["advertisedDateTimeUtc"]
                            .as_str()
                            .unwrap_or_default()
                            .to_string(),
                    })
                })
        })
        .collect()
}

/// Current fluctuation of the competitor's fixed-win price.
pub fn current_fixed_win(competitor: &Value) -> Option<f64> {
    let fixed_win = competitor["prices"]
        .as_array()?
        .iter()
        .find(|p| p["betType"].as_str() == Some("FixedWin"))?;
    let current = fixed_win["flucs"]
        .as_array()?
        .iter()
        .find(|f| f["productType"].as_str() == Some("Current"))?;
    let price = &current["price"];
    price
        .as_f64()
        .or_else(|| price.as_str().and_then(|s| s.parse().ok()))
}

/// Priced, non-vacant starters of one event.
pub fn competitor_rows(event: &OpenEvent, event_json: &Value) -> Vec<OddsRow> {
    let Some(competitors) = event_json["data"]["viewer"]["event"]["competitors"].as_array() else {
        return Vec::new();
    };
    let time = local_time(&event.advertised);

    competitors
        .iter()
        .filter_map(|c| {
            let runner = c["name"].as_str().unwrap_or("Unknown");
            if runner == VACANT_BOX {
                return None;
            }
            let box_number = c["startPos"].as_i64().unwrap_or(0);
            if box_number == 0 {
                return None;
            }
            Some(OddsRow {
                meeting: event.meeting.clone(),
                race: event.race,
                time: time.clone(),
                distance: event.distance,
                runner: runner.to_string(),
                rug: c["sequence"].as_i64(),
                box_number,
                price: current_fixed_win(c)?,
            })
        })
        .collect()
}

pub fn sort_rows(rows: &mut [OddsRow]) {
    rows.sort_by(|a, b| {
        (&a.meeting, a.race, a.box_number).cmp(&(&b.meeting, b.race, b.box_number))
    });
}

/// `2024-03-05T08:42:00Z` in the local timezone; unparseable input is returned unchanged.
pub fn local_time(utc: &str) -> String {
    DateTime::parse_from_rfc3339(utc)
        .map(|d| d.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(utc, "%Y-%m-%dT%H:%M:%SZ").map(|n| n.and_utc()))
        .map(|d| d.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|_| utc.to_string())
}

// ── Client ──

pub struct OddsClient {
    http: reqwest::Client,
    url: String,
}

impl Default for OddsClient {
    fn default() -> Self {
        Self::new(GRAPHQL_URL)
    }
}

impl OddsClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
        }
    }

    async fn post<B: Serialize>(&self, operation: &str, body: &B) -> Result<Value> {
        let mut attempt = 0;
        loop {
            let response = self
                .http
                .post(&self.url)
                .json(body)
                .send()
                .await
                .with_context(|| format!("{} request failed", operation))?;

            let status = response.status();
            if status.is_success() {
                return response
                    .json::<Value>()
                    .await
                    .with_context(|| format!("{} returned invalid JSON", operation));
            }

            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if !retryable || attempt == MAX_RETRIES {
                bail!("{} failed with status {}", operation, status);
            }

            let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
            warn!(
                "{} returned {} (attempt {}/{}), backing off {:.1}s",
                operation,
                status,
                attempt + 1,
                MAX_RETRIES,
                backoff.as_secs_f64()
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    pub async fn meetings(&self, race_type: &'static str) -> Result<Value> {
        let (start, end) = day_window(Local::now());
        let body = GraphQlRequest::persisted(
            MEETINGS_QUERY,
            MEETINGS_QUERY_HASH,
            MeetingListVariables {
                country_codes: Vec::new(),
                client_country_code: CLIENT_COUNTRY,
                virtual_start_date_time: start.clone(),
                virtual_end_date_time: end.clone(),
                start_date_time: start,
                end_date_time: end,
                is_rendering_virtual: false,
                fetch_trc: false,
                race_types: vec![race_type],
            },
        );
        self.post(MEETINGS_QUERY, &body).await
    }

    pub async fn event(&self, event_key: &str) -> Result<Value> {
        let body = GraphQlRequest::persisted(
            EVENT_QUERY,
            EVENT_QUERY_HASH,
            EventVariables {
                client_country_code: CLIENT_COUNTRY,
                event_key: event_key.to_string(),
                fetch_trc: false,
            },
        );
        self.post(EVENT_QUERY, &body).await
    }
}

/// Today's prices for every open race of the species, sorted by meeting, race and box.
pub async fn fetch_odds(client: OddsClient, species: Species) -> Result<Vec<OddsRow>> {
    let code = race_type(species);
    let meetings = client.meetings(code).await?;
    let events = open_events(&meetings, code);
    info!("{} open {} events", events.len(), species.as_str());

    let client = Arc::new(client);
    let semaphore = Arc::new(Semaphore::new(CONCURRENCY));

    let pb = ProgressBar::new(events.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let (tx, mut rx) = tokio::sync::mpsc::channel::<Vec<OddsRow>>(CONCURRENCY * 2);

    for event in events {
        let client = Arc::clone(&client);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();

        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire().await else {
                return;
            };
            let rows = match client.event(&event.event_key).await {
                Ok(json) => competitor_rows(&event, &json),
                Err(e) => {
                    warn!("Skipping {} race {}: {:#}", event.meeting, event.race, e);
                    Vec::new()
                }
            };
            let _ = tx.send(rows).await;
        });
    }

    // rx closes once every task has dropped its sender
    drop(tx);

    let mut rows = Vec::new();
    while let Some(batch) = rx.recv().await {
        rows.extend(batch);
        pb.inc(1);
    }
    pb.finish_and_clear();

    sort_rows(&mut rows);
    Ok(rows)
}

// ── Tests ──
