//! # Fitbit Activity
//!
//! Today's step count and totals from the Fitbit Web API.
//!
//! ## Authorization (OAuth2 with PKCE)
//! 1. With no stored tokens and no `auth_code` in the config, the authorization
//!    URL is logged. Visiting it and approving yields a one-time code.
//! 2. With `auth_code` set, the code is exchanged for an access and a refresh
//!    token using the PKCE `code_verifier`.
//! 3. Access tokens are refreshed 60 seconds before they expire.
//!
//! ## Token Persistence
//! Tokens live in a small JSON file (`token_file`, default
//! `fitbit-tokens.json`) so a restart does not need a new authorization code.
//! Authorization codes are single use; once tokens exist the code is ignored.

use crate::config::FitbitConfig;
use crate::services::{ActivitySummary, Fetcher, Payload, ServiceError, REQUEST_TIMEOUT};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Local, Utc};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Refresh this long before the access token expires
const EXPIRY_MARGIN_SECS: i64 = 60;

/// OAuth2 tokens as persisted on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user_id: Option<String>,
}

/// Token endpoint answer.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user_id: Option<String>,
}

impl TokenResponse {
    fn into_tokens(self, now: DateTime<Utc>) -> Result<Tokens, ServiceError> {
        let expires_at = Duration::try_seconds(self.expires_in)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                ServiceError::Malformed(format!("token lifetime {}s out of range", self.expires_in))
            })?;
        Ok(Tokens {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user_id: self.user_id,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ActivityResponse {
    summary: Option<SummaryJson>,
    goals: Option<GoalsJson>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryJson {
    steps: Option<u32>,
    calories_out: Option<u32>,
    floors: Option<u32>,
    #[serde(default)]
    distances: Vec<DistanceJson>,
}

#[derive(Debug, Deserialize)]
struct DistanceJson {
    activity: String,
    distance: f32,
}

#[derive(Debug, Deserialize)]
struct GoalsJson {
    steps: Option<u32>,
}

/// JSON file holding the current tokens.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored tokens, or `None` if nothing was saved yet.
    pub fn load(&self) -> Result<Option<Tokens>, ServiceError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let tokens = serde_json::from_slice(&data).map_err(io::Error::from)?;
        Ok(Some(tokens))
    }

    pub fn save(&self, tokens: &Tokens) -> Result<(), ServiceError> {
        let data = serde_json::to_vec_pretty(tokens).map_err(io::Error::from)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}

/// PKCE S256 challenge: unpadded base64url of the SHA-256 of the verifier.
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// URL the user visits once to authorize the clock.
pub fn authorization_url(config: &FitbitConfig) -> Result<Url, ServiceError> {
    let challenge = code_challenge(&config.code_verifier);
    Url::parse_with_params(
        &config.authorize_url,
        &[
            ("client_id", config.client_id.as_str()),
            ("response_type", "code"),
            ("code_challenge", challenge.as_str()),
            ("code_challenge_method", "S256"),
            ("scope", config.scope.as_str()),
        ],
    )
    .map_err(|err| ServiceError::Malformed(format!("authorization URL: {}", err)))
}

/// True once `tokens` are within the expiry margin.
pub fn needs_refresh(tokens: &Tokens, now: DateTime<Utc>) -> bool {
    now >= tokens.expires_at - Duration::seconds(EXPIRY_MARGIN_SECS)
}

/// Daily activity summary from an `activities/date/<date>.json` body.
pub fn parse_activity(body: &str) -> Result<ActivitySummary, ServiceError> {
    let response: ActivityResponse =
        serde_json::from_str(body).map_err(|err| ServiceError::Malformed(err.to_string()))?;
    let summary = response
        .summary
        .ok_or_else(|| ServiceError::Malformed("missing summary".into()))?;

    let distance_km = summary
        .distances
        .iter()
        .find(|distance| distance.activity == "total")
        .map(|distance| distance.distance);

    Ok(ActivitySummary {
        steps: summary.steps,
        step_goal: response.goals.and_then(|goals| goals.steps),
        calories: summary.calories_out,
        distance_km,
        floors: summary.floors,
    })
}

pub struct FitbitFetcher {
    client: Client,
    config: FitbitConfig,
    store: TokenStore,
    tokens: Option<Tokens>,
}

impl FitbitFetcher {
    pub fn new(config: FitbitConfig) -> Result<Self, ServiceError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let store = TokenStore::new(&config.token_file);
        let tokens = match store.load() {
            Ok(tokens) => tokens,
            Err(err) => {
                warn!("Ignoring unreadable Fitbit tokens in {}: {}", store.path().display(), err);
                None
            }
        };

        if tokens.is_none() && config.auth_code.is_empty() {
            let url = authorization_url(&config)?;
            warn!(
                "Fitbit is not authorized yet. Open {} and put the code in fitbit.auth_code",
                url
            );
        }

        Ok(Self {
            client,
            config,
            store,
            tokens,
        })
    }

    /// A valid access token, exchanging the code or refreshing as needed.
    async fn access_token(&mut self, now: DateTime<Utc>) -> Result<String, ServiceError> {
        let tokens = match self.tokens.clone() {
            Some(tokens) if !needs_refresh(&tokens, now) => tokens,
            Some(tokens) => {
                debug!("Fitbit access token expires at {}, refreshing", tokens.expires_at);
                self.request_tokens(&[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", tokens.refresh_token.as_str()),
                    ("client_id", self.config.client_id.as_str()),
                ])
                .await?
            }
            None if self.config.auth_code.is_empty() => {
                return Err(ServiceError::Unauthorized(
                    "no tokens and no authorization code configured".into(),
                ));
            }
            None => {
                info!("Exchanging Fitbit authorization code for tokens");
                self.request_tokens(&[
                    ("client_id", self.config.client_id.as_str()),
                    ("grant_type", "authorization_code"),
                    ("code", self.config.auth_code.as_str()),
                    ("code_verifier", self.config.code_verifier.as_str()),
                ])
                .await?
            }
        };

        let access_token = tokens.access_token.clone();
        self.tokens = Some(tokens);
        Ok(access_token)
    }

    async fn request_tokens(&self, form: &[(&str, &str)]) -> Result<Tokens, ServiceError> {
        let response = self
            .client
            .post(&self.config.token_url)
            .form(form)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ServiceError::Unauthorized(format!("token request {}: {}", status, body)));
        }

        let tokens = serde_json::from_str::<TokenResponse>(&body)
            .map_err(|err| ServiceError::Malformed(err.to_string()))?
            .into_tokens(Utc::now())?;
        if let Err(err) = self.store.save(&tokens) {
            warn!("Could not persist Fitbit tokens: {}", err);
        }
        Ok(tokens)
    }
}

impl Fetcher for FitbitFetcher {
    fn name(&self) -> &'static str {
        "fitbit"
    }

    async fn fetch(&mut self) -> Result<Payload, ServiceError> {
        let access_token = self.access_token(Utc::now()).await?;
        let date = Local::now().format("%Y-%m-%d").to_string();
        let url = format!("{}{}.json", self.config.activity_url, date);

        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        debug!("Fitbit response {}: {} bytes", status, body.len());

        if status == reqwest::StatusCode::UNAUTHORIZED {
            // Revoked or expired early: force a refresh on the next poll
            if let Some(tokens) = &mut self.tokens {
                tokens.expires_at = Utc::now();
            }
            return Err(ServiceError::Unauthorized(body));
        }
        if !status.is_success() {
            return Err(ServiceError::Status(status));
        }
        parse_activity(&body).map(Payload::Activity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn pkce_challenge_matches_rfc_7636_example() {
        assert_eq!(
            code_challenge("dBjftJeZ4CVP-mJ92K9qPUEjtQ4LUQJ6yuhBmQf5oUU"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn authorization_url_has_pkce_parameters() {
        let config = FitbitConfig {
            client_id: "ABC123".into(),
            code_verifier: "dBjftJeZ4CVP-mJ92K9qPUEjtQ4LUQJ6yuhBmQf5oUU".into(),
            ..Default::default()
        };
        let url = authorization_url(&config).unwrap();
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert!(url.as_str().starts_with("https://www.fitbit.com/oauth2/authorize?"));
        assert!(query.contains(&("client_id".into(), "ABC123".into())));
        assert!(query.contains(&("response_type".into(), "code".into())));
        assert!(query.contains(&("code_challenge_method".into(), "S256".into())));
        assert!(query.contains(&(
            "code_challenge".into(),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".into()
        )));
        assert!(query.contains(&("scope".into(), "activity".into())));
    }

    #[test]
    fn tokens_refresh_one_minute_early() {
        let expires_at = Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap();
        let tokens = Tokens {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_at,
            user_id: None,
        };

        assert!(!needs_refresh(&tokens, expires_at - Duration::seconds(61)));
        assert!(needs_refresh(&tokens, expires_at - Duration::seconds(60)));
        assert!(needs_refresh(&tokens, expires_at + Duration::hours(1)));
    }

    #[test]
    fn token_response_sets_absolute_expiry() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token":"a","refresh_token":"r","expires_in":28800,"user_id":"XYZ","token_type":"Bearer"}"#,
        )
        .unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap();
        let tokens = response.into_tokens(now).unwrap();
        assert_eq!(tokens.expires_at, now + Duration::hours(8));
        assert_eq!(tokens.user_id.as_deref(), Some("XYZ"));
    }

    #[test]
    fn token_response_with_absurd_lifetime_is_malformed() {
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap();
        for expires_in in [i64::MAX, i64::MIN, 9_000_000_000_000_000] {
            let response = TokenResponse {
                access_token: "a".into(),
                refresh_token: "r".into(),
                expires_in,
                user_id: None,
            };
            assert!(matches!(
                response.into_tokens(now),
                Err(ServiceError::Malformed(_))
            ));
        }
    }

    #[test]
    fn token_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));
        assert_eq!(store.load().unwrap(), None);

        let tokens = Tokens {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_at: Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap(),
            user_id: Some("XYZ".into()),
        };
        store.save(&tokens).unwrap();
        assert_eq!(store.load().unwrap(), Some(tokens));

        fs::write(store.path(), "not json").unwrap();
        assert!(matches!(store.load(), Err(ServiceError::TokenStore(_))));
    }

    #[test]
    fn parses_daily_summary() {
        let body = r#"{
            "activities": [],
            "goals": {"caloriesOut": 2500, "distance": 8.05, "floors": 10, "steps": 10000},
            "summary": {
                "caloriesOut": 1832,
                "distances": [
                    {"activity": "total", "distance": 4.12},
                    {"activity": "tracker", "distance": 4.12}
                ],
                "floors": 7,
                "steps": 5423
            }
        }"#;
        let summary = parse_activity(body).unwrap();
        assert_eq!(
            summary,
            ActivitySummary {
                steps: Some(5423),
                step_goal: Some(10000),
                calories: Some(1832),
                distance_km: Some(4.12),
                floors: Some(7),
            }
        );

        assert!(matches!(
            parse_activity(r#"{"errors": []}"#),
            Err(ServiceError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn unauthorized_without_code_or_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher = FitbitFetcher::new(FitbitConfig {
            client_id: "ABC123".into(),
            token_file: dir.path().join("tokens.json"),
            ..Default::default()
        })
        .unwrap();

        assert!(matches!(
            fetcher.fetch().await,
            Err(ServiceError::Unauthorized(_))
        ));
    }
}
