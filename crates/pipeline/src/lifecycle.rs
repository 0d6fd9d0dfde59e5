//! The receipt check lifecycle: validate → claim → (background) fetch →
//! decode → parse, with every transition persisted as guarded flag updates.

use std::collections::HashMap;
use std::sync::Arc;

use cheq_core::CheckStatus;
use cheq_decoder::{decode_receipt_bytes, decode_text};
use cheq_storage::{checks, DbPool};
use thiserror::Error;
use tracing::{error, info};

use crate::fetcher::Fetcher;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("invalid check url ({0})")]
    Validation(&'static str),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

// ── URL validation ───────────────────────────────────────────────────────────

const REGISTRY_HOST: &str = "cabinet.tax.gov.ua";
const REGISTRY_PATH: &str = "/cashregs/check";
const REQUIRED_PARAMS: [&str; 5] = ["fn", "id", "sm", "time", "date"];

struct UrlParts<'a> {
    scheme: &'a str,
    host: &'a str,
    path: &'a str,
    query: &'a str,
}

fn split_url(url: &str) -> Option<UrlParts<'_>> {
    let (scheme, rest) = url.split_once("://")?;
    let (authority, tail) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, ""),
    };
    let host = authority
        .rsplit_once('@')
        .map_or(authority, |(_, h)| h)
        .split(':')
        .next()
        .unwrap_or("");
    let (path, query) = match tail.split_once('?') {
        Some((p, q)) => (p, q),
        None => (tail, ""),
    };
    Some(UrlParts { scheme, host, path, query })
}

fn query_param<'a>(query: &'a str, name: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

/// A submitted URL must point at the registry's check endpoint and carry the
/// full receipt reference. Anything else is rejected before touching storage.
pub fn validate_check_url(url: &str) -> Result<(), LifecycleError> {
    let parts = split_url(url).ok_or(LifecycleError::Validation("scheme"))?;
    if parts.scheme != "http" && parts.scheme != "https" {
        return Err(LifecycleError::Validation("scheme"));
    }
    if !parts.host.eq_ignore_ascii_case(REGISTRY_HOST) {
        return Err(LifecycleError::Validation("host"));
    }
    if parts.path != REGISTRY_PATH {
        return Err(LifecycleError::Validation("path"));
    }
    for name in REQUIRED_PARAMS {
        if query_param(parts.query, name).is_none() {
            return Err(LifecycleError::Validation("missing params"));
        }
    }
    Ok(())
}

/// The registry-issued receipt id is the URL's `id` query parameter.
pub fn extract_check_id(url: &str) -> Result<String, LifecycleError> {
    let parts = split_url(url).ok_or(LifecycleError::Validation("scheme"))?;
    match query_param(parts.query, "id") {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(LifecycleError::Validation("missing id")),
    }
}

// ── State machine ────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct CheckLifecycle {
    pool: DbPool,
    fetcher: Arc<dyn Fetcher>,
}

impl CheckLifecycle {
    pub fn new(pool: DbPool, fetcher: Arc<dyn Fetcher>) -> Self {
        CheckLifecycle { pool, fetcher }
    }

    /// Start retrieving a receipt. Idempotent per check: a record that is
    /// already founded, or whose fetch is still in flight, reports its
    /// current status without starting another fetch.
    pub async fn request_find(
        &self,
        url: &str,
        owner_id: i64,
    ) -> Result<CheckStatus, LifecycleError> {
        validate_check_url(url)?;
        let check_id = extract_check_id(url)?;

        if let Some(existing) = checks::get_check(&self.pool, &check_id).await? {
            if existing.owner_id != owner_id {
                info!(check_id = %check_id, from = existing.owner_id, to = owner_id,
                    "reassigning check ownership");
            }
        }
        let check = checks::create_or_claim(&self.pool, &check_id, owner_id, url).await?;

        if check.founded {
            return Ok(check.status());
        }
        if !checks::try_begin_finding(&self.pool, &check_id).await? {
            // Another caller holds the finding flag.
            return self.status(&check_id).await;
        }

        let this = self.clone();
        let task_url = url.to_string();
        tokio::spawn(async move {
            this.run_find(&task_url, &check_id).await;
        });

        Ok(CheckStatus::from_flags(false, false, true))
    }

    async fn run_find(&self, url: &str, check_id: &str) {
        let outcome = match self.fetcher.fetch(url).await {
            Ok(bytes) => self.complete_find(check_id, &bytes).await,
            Err(e) => self.fail_find(check_id, &e.to_string()).await,
        };
        if let Err(e) = outcome {
            error!(check_id = %check_id, error = %e, "find task could not persist outcome");
        }
    }

    /// Retrieval finished: decode the charset, reject an empty payload,
    /// store the text as founded and immediately attempt the parse.
    pub async fn complete_find(
        &self,
        check_id: &str,
        raw_bytes: &[u8],
    ) -> Result<(), LifecycleError> {
        let xml_text = decode_receipt_bytes(raw_bytes);
        if xml_text.is_empty() {
            return self.fail_find(check_id, "downloaded receipt is empty").await;
        }
        checks::set_founded(&self.pool, check_id, &xml_text).await?;
        self.parse(check_id).await
    }

    /// Record a failed attempt. `founded` is left untouched: a bad download
    /// is retried, while a bad parse of a good download keeps its text.
    pub async fn fail_find(&self, check_id: &str, message: &str) -> Result<(), LifecycleError> {
        info!(check_id = %check_id, message, "check attempt failed");
        checks::set_error(&self.pool, check_id, message).await?;
        Ok(())
    }

    /// Direct path bypassing the fetch: the client pasted the receipt text.
    pub async fn save_from_client(
        &self,
        url: &str,
        xml_text: &str,
        owner_id: i64,
    ) -> Result<CheckStatus, LifecycleError> {
        validate_check_url(url)?;
        let check_id = extract_check_id(url)?;

        let xml_text = xml_text.trim();
        if xml_text.is_empty() {
            return Err(LifecycleError::Validation("empty check text"));
        }

        checks::upsert_from_client(&self.pool, &check_id, owner_id, url, xml_text).await?;

        let this = self.clone();
        let task_id = check_id.clone();
        tokio::spawn(async move {
            if let Err(e) = this.parse(&task_id).await {
                error!(check_id = %task_id, error = %e, "parse task could not persist outcome");
            }
        });

        self.status(&check_id).await
    }

    /// Decode the stored raw text into the normalized summary. A decode
    /// failure becomes the check's error state; the raw text stays for a
    /// later re-parse.
    pub async fn parse(&self, check_id: &str) -> Result<(), LifecycleError> {
        let Some(check) = checks::get_check(&self.pool, check_id).await? else {
            return Ok(());
        };
        let Some(xml_text) = check.xml_text else {
            return Ok(());
        };

        match decode_text(&xml_text) {
            Ok(receipt) => {
                let summary_json = serde_json::to_string(&receipt.summary())?;
                checks::set_saved(&self.pool, check_id, &summary_json).await?;
                Ok(())
            }
            Err(e) => self.fail_find(check_id, &e.to_string()).await,
        }
    }

    pub async fn status(&self, check_id: &str) -> Result<CheckStatus, LifecycleError> {
        let status = checks::get_check(&self.pool, check_id)
            .await?
            .map(|c| c.status())
            .unwrap_or_else(CheckStatus::missing);
        Ok(status)
    }

    /// Status of every check the owner holds, keyed by check id.
    pub async fn status_map(
        &self,
        owner_id: i64,
    ) -> Result<HashMap<String, CheckStatus>, LifecycleError> {
        let rows = checks::checks_for_owner(&self.pool, owner_id).await?;
        Ok(rows.into_iter().map(|c| (c.id.clone(), c.status())).collect())
    }
}
