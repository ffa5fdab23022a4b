//! Page-by-page list aggregation.
//!
//! List endpoints answer with `{total, limit, items}`. [`Manager::collect`]
//! walks `page=1, 2, ...` until it holds `total` items.

use crate::manager::{ApiRequest, Manager};
use crate::Result;
use bcc_core::query::Arguments;
use bcc_core::Error;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One decoded page of a list endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Total number of items across all pages
    pub total: usize,
    /// Page size the server applied
    pub limit: usize,
    /// Items on this page
    pub items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    total: usize,
    #[serde(default)]
    limit: usize,
    #[serde(default)]
    items: Value,
}

/// Number of items page `page` (1-based) should hold.
#[must_use]
pub fn expected_page_len(total: usize, limit: usize, page: u32) -> usize {
    let before = limit.saturating_mul(page.saturating_sub(1) as usize);
    total.saturating_sub(before).min(limit)
}

fn decode_items<T>(items: Value, capacity: usize) -> serde_json::Result<Vec<T>>
where
    T: DeserializeOwned,
{
    match items {
        Value::Null => Ok(Vec::new()),
        Value::Array(values) => {
            let mut decoded = Vec::with_capacity(capacity);
            for value in values {
                decoded.push(T::deserialize(value)?);
            }
            Ok(decoded)
        }
        other => Vec::<T>::deserialize(other),
    }
}

impl Manager {
    /// Fetch a single page of a list endpoint.
    ///
    /// `args` is left untouched; the `page` argument is set on a copy.
    ///
    /// # Errors
    ///
    /// Propagates execution errors; a malformed envelope or undecodable item
    /// is an [`Error::DecodeError`].
    pub async fn get_page<T>(
        &self,
        cancel: &CancellationToken,
        path: &str,
        args: &Arguments,
        page: u32,
    ) -> Result<Page<T>>
    where
        T: DeserializeOwned,
    {
        let query = args.clone().with("page", page);
        debug!(path, query = %query.to_query_string(), "GET page");

        let execution = self
            .execute(cancel, &ApiRequest::get(path).with_query(query))
            .await?;
        let envelope: Envelope = execution.decode()?;

        let expected = expected_page_len(envelope.total, envelope.limit, page);
        let items = decode_items(envelope.items, expected).map_err(|err| {
            Error::decode(
                execution.url().as_str(),
                format!("JSON items decode failed on {path}, page {page}: {err}"),
                execution.body(),
            )
        })?;

        Ok(Page {
            total: envelope.total,
            limit: envelope.limit,
            items,
        })
    }

    /// Fetch every page of a list endpoint into one vector.
    ///
    /// Pages are requested sequentially until the collected count equals the
    /// reported `total`. Nothing is returned on failure.
    ///
    /// # Errors
    ///
    /// Returns the first page error, or an [`Error::DecodeError`] when a page
    /// comes back empty before `total` is reached or the count overshoots it.
    pub async fn collect<T>(
        &self,
        cancel: &CancellationToken,
        path: &str,
        args: &Arguments,
    ) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let mut items = Vec::new();
        let mut page: u32 = 1;

        loop {
            let current = self.get_page::<T>(cancel, path, args, page).await?;
            let fetched = current.items.len();
            items.extend(current.items);

            if items.len() == current.total {
                break;
            }

            if fetched == 0 || items.len() > current.total {
                return Err(Error::decode(
                    path,
                    format!(
                        "pagination stopped at page {page} with {} of {} items",
                        items.len(),
                        current.total
                    ),
                    b"",
                ));
            }

            page += 1;
        }

        debug!(path, count = items.len(), pages = page, "Retrieved items");
        Ok(items)
    }
}
