use anyhow::Context;
use chrono::NaiveDate;
use itertools::Itertools;
use log::{debug, warn};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::session::Session;

pub const DEFAULT_LIMIT: usize = 50;

/// Downloads the transaction feed with an authenticated session.
pub trait TransactionFetcher {
    /// `Ok(None)` if the feed was not served (non-200) or was not JSON; typically the session
    /// is no longer accepted and the portal answered with its login page.
    async fn fetch(&self, session: &Session) -> anyhow::Result<Option<Value>>;
}

pub struct HttpTransactionFetcher {
    url: Url,
}

impl HttpTransactionFetcher {
    pub fn new(url: Url) -> Self {
        Self { url }
    }
}

impl TransactionFetcher for HttpTransactionFetcher {
    async fn fetch(&self, session: &Session) -> anyhow::Result<Option<Value>> {
        let response = session.reqwest().get(self.url.clone()).send().await?;
        if response.status() != StatusCode::OK {
            warn!("The transaction download returned {}.", response.status());
            return Ok(None);
        }
        let body = response.bytes().await?;
        match serde_json::from_slice(&body) {
            Ok(document) => Ok(Some(document)),
            Err(e) => {
                warn!("The transaction download is not JSON: {e}");
                Ok(None)
            }
        }
    }
}

/// The most recent booked transactions, newest first.
#[derive(Debug, PartialEq, Serialize)]
pub struct ProcessedResult {
    pub data: BookedTransactions,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct BookedTransactions {
    pub booked: Vec<Value>,
}

/// Sorts `transactions.booked` by `bookingDate`, newest first, and keeps the first `limit`.
///
/// Returns `Ok(None)` if the document does not have that shape. Transactions sharing a
/// booking date keep their order in the feed. A transaction without a parseable
/// `bookingDate` is an error.
pub fn process(document: &Value, limit: usize) -> anyhow::Result<Option<ProcessedResult>> {
    let Some(booked) = document
        .get("transactions")
        .and_then(|transactions| transactions.get("booked"))
        .and_then(Value::as_array)
    else {
        return Ok(None);
    };
    let mut dated = booked
        .iter()
        .enumerate()
        .map(|(i, transaction)| {
            let date = booking_date(transaction)
                .with_context(|| format!("In booked transaction #{i}"))?;
            anyhow::Ok((date, transaction))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    // `sort_by` is stable, so equal dates stay in feed order.
    dated.sort_by(|(x, _), (y, _)| y.cmp(x));
    debug!(
        "Keeping {} of {} booked transactions",
        limit.min(dated.len()),
        dated.len()
    );
    let booked = dated
        .into_iter()
        .take(limit)
        .map(|(_, transaction)| transaction.clone())
        .collect_vec();
    Ok(Some(ProcessedResult {
        data: BookedTransactions { booked },
    }))
}

fn booking_date(transaction: &Value) -> anyhow::Result<NaiveDate> {
    let date = transaction
        .get("bookingDate")
        .and_then(Value::as_str)
        .context("`bookingDate` is missing or not a string")?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .with_context(|| format!("Invalid `bookingDate`: {date:?}"))
}
