//! Entity resolution and merge engine.
//!
//! Ingestion run against multiple providers over time creates duplicate
//! company rows: a filings provider reports a CIK before any ticker-keyed
//! row has confirmed it, so a placeholder is auto-created. Once the
//! association is confirmed (by a later ticker-keyed ingestion, or by an
//! operator override), [`MetricStore::merge_duplicates`] collapses the
//! placeholder back into the canonical row:
//!
//! 1. build the identifier map `cik -> canonical company id` from confirmed
//!    ticker↔CIK pairs plus operator overrides (many historical CIKs may
//!    map to one company);
//! 2. re-parent every filing owned by a placeholder whose CIK resolves;
//! 3. backfill `cik` on canonical rows where it was still null;
//! 4. verify the total filing count is conserved;
//! 5. delete placeholders that are fully re-parented and not referenced by
//!    any metric;
//! 6. verify no placeholder with a resolvable CIK remains.
//!
//! The whole run is one IMMEDIATE transaction: the write lock is taken up
//! front so a concurrent ingestion cannot insert a new duplicate mid-merge,
//! and any invariant failure in step 4 or 6 rolls the entire run back and
//! surfaces the offending identifier pairs.

use rusqlite::{OptionalExtension, Transaction, TransactionBehavior, params};
use std::collections::HashMap;
use tracing::{info, instrument, warn};

use ingest_core::{Cik, CompanyId, IngestError, Result, Ticker};

use crate::MetricStore;

/// An operator-supplied ticker↔CIK association for cases the store cannot
/// confirm on its own (e.g. one ticker with multiple historical CIKs).
///
/// When several overrides name the same ticker, list the primary CIK first;
/// it is the one backfilled onto the canonical row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeOverride {
    /// Ticker of the canonical company.
    pub ticker: Ticker,
    /// A CIK that belongs to it.
    pub cik: Cik,
}

/// What a merge run did, for logging and manual review.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergeReport {
    /// Entries in the identifier map (confirmed pairs + overrides).
    pub mapped: usize,
    /// Filings moved from placeholder rows to canonical rows.
    pub reparented_filings: usize,
    /// CIKs newly set on canonical rows.
    pub backfilled: Vec<(CompanyId, Cik)>,
    /// Placeholder rows deleted after full re-parenting.
    pub deleted_placeholders: usize,
    /// Placeholders whose CIK has no mapping yet; deferred, not an error.
    pub unresolved: Vec<(Cik, CompanyId)>,
    /// Total filings before the run.
    pub filings_before: u64,
    /// Total filings after the run (equal to `filings_before` on success).
    pub filings_after: u64,
}

fn store_err(e: rusqlite::Error) -> IngestError {
    IngestError::Store(e.to_string())
}

impl MetricStore {
    /// Detects placeholder duplicates and merges them into their canonical
    /// companies inside a single transaction.
    ///
    /// # Errors
    /// Returns [`IngestError::MergeInvariant`] — with the offending
    /// (cik, company) pairs and nothing persisted — when the filing
    /// conservation check fails, when a resolvable placeholder survives the
    /// run (e.g. it is still referenced by a metric), or when an override
    /// contradicts a confirmed mapping.
    #[instrument(skip(self, overrides), fields(overrides = overrides.len()))]
    pub fn merge_duplicates(&self, overrides: &[MergeOverride]) -> Result<MergeReport> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(store_err)?;

        let mut report = MergeReport::default();

        // Step 1: identifier map from confirmed ticker-keyed associations.
        let mut map: HashMap<Cik, CompanyId> = HashMap::new();
        {
            let mut stmt = tx
                .prepare(
                    "SELECT cik, id FROM companies
                     WHERE is_placeholder = 0 AND ticker IS NOT NULL AND cik IS NOT NULL",
                )
                .map_err(store_err)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })
                .map_err(store_err)?;
            for row in rows {
                let (cik, id) = row.map_err(store_err)?;
                map.insert(Cik::new(cik), CompanyId(id));
            }
        }

        // Overrides extend the map; contradicting a confirmed pair is an
        // ambiguous mapping and aborts before anything is written.
        for o in overrides {
            let canonical = canonical_id_by_ticker(&tx, &o.ticker)?.ok_or_else(|| {
                IngestError::InvalidParameter(format!(
                    "merge override names unknown ticker {}",
                    o.ticker
                ))
            })?;
            match map.insert(o.cik.clone(), canonical) {
                Some(prior) if prior != canonical => {
                    return Err(IngestError::MergeInvariant {
                        reason: format!(
                            "override maps cik {} to company {canonical} but it is already mapped to {prior}",
                            o.cik
                        ),
                        pairs: vec![(o.cik.clone(), prior)],
                    });
                }
                _ => {}
            }
        }
        report.mapped = map.len();

        report.filings_before = total_filings(&tx)?;

        // Step 2: re-parent filings owned by resolvable placeholders.
        let placeholders = placeholder_rows(&tx)?;
        let mut resolved: Vec<(Cik, CompanyId, CompanyId)> = Vec::new();
        for (placeholder_id, cik) in &placeholders {
            match map.get(cik) {
                Some(&canonical) => {
                    let moved = tx
                        .execute(
                            "UPDATE sec_filings SET company_id = ?1 WHERE company_id = ?2",
                            params![canonical.0, placeholder_id.0],
                        )
                        .map_err(store_err)?;
                    report.reparented_filings += moved;
                    resolved.push((cik.clone(), *placeholder_id, canonical));
                }
                None => report.unresolved.push((cik.clone(), *placeholder_id)),
            }
        }

        // Step 3: backfill CIKs on canonical rows that were still null.
        for o in overrides {
            let canonical = map[&o.cik];
            let had_cik: Option<String> = tx
                .query_row(
                    "SELECT cik FROM companies WHERE id = ?1",
                    params![canonical.0],
                    |row| row.get(0),
                )
                .map_err(store_err)?;
            if had_cik.is_none() {
                tx.execute(
                    "UPDATE companies SET cik = ?1, updated_at = ?2 WHERE id = ?3",
                    params![
                        o.cik.as_str(),
                        chrono::Utc::now().to_rfc3339(),
                        canonical.0
                    ],
                )
                .map_err(store_err)?;
                report.backfilled.push((canonical, o.cik.clone()));
            }
        }

        // Step 4: conservation — no filing gained or lost.
        report.filings_after = total_filings(&tx)?;
        if report.filings_after != report.filings_before {
            return Err(IngestError::MergeInvariant {
                reason: format!(
                    "filing count changed during merge: {} before, {} after",
                    report.filings_before, report.filings_after
                ),
                pairs: resolved.iter().map(|(c, _, id)| (c.clone(), *id)).collect(),
            });
        }

        // Step 5: delete placeholders that are fully re-parented and not
        // referenced by any metric.
        for (_, placeholder_id, _) in &resolved {
            let deleted = tx
                .execute(
                    "DELETE FROM companies
                     WHERE id = ?1 AND is_placeholder = 1
                       AND NOT EXISTS (SELECT 1 FROM sec_filings WHERE company_id = ?1)
                       AND NOT EXISTS (SELECT 1 FROM financial_metrics WHERE company_id = ?1)",
                    params![placeholder_id.0],
                )
                .map_err(store_err)?;
            report.deleted_placeholders += deleted;
        }

        // Step 6: no placeholder with a resolvable CIK may remain.
        let leftover: Vec<(Cik, CompanyId)> = placeholder_rows(&tx)?
            .into_iter()
            .filter(|(_, cik)| map.contains_key(cik))
            .map(|(id, cik)| (cik, id))
            .collect();
        if !leftover.is_empty() {
            warn!(count = leftover.len(), "resolvable placeholders survived merge");
            return Err(IngestError::MergeInvariant {
                reason: "resolvable placeholder companies remain after merge".to_string(),
                pairs: leftover,
            });
        }

        tx.commit().map_err(store_err)?;
        info!(
            mapped = report.mapped,
            reparented = report.reparented_filings,
            deleted = report.deleted_placeholders,
            unresolved = report.unresolved.len(),
            "merge run committed"
        );
        Ok(report)
    }
}

fn canonical_id_by_ticker(tx: &Transaction<'_>, ticker: &Ticker) -> Result<Option<CompanyId>> {
    tx.query_row(
        "SELECT id FROM companies WHERE ticker = ?1 AND is_placeholder = 0",
        params![ticker.as_str()],
        |row| row.get(0).map(CompanyId),
    )
    .optional()
    .map_err(store_err)
}

fn placeholder_rows(tx: &Transaction<'_>) -> Result<Vec<(CompanyId, Cik)>> {
    let mut stmt = tx
        .prepare("SELECT id, cik FROM companies WHERE is_placeholder = 1 AND cik IS NOT NULL")
        .map_err(store_err)?;
    let rows = stmt
        .query_map([], |row| {
            Ok((CompanyId(row.get(0)?), row.get::<_, String>(1)?))
        })
        .map_err(store_err)?;
    rows.map(|r| r.map(|(id, cik)| (id, Cik::new(cik))).map_err(store_err))
        .collect()
}

fn total_filings(tx: &Transaction<'_>) -> Result<u64> {
    tx.query_row("SELECT COUNT(*) FROM sec_filings", [], |row| row.get(0))
        .map_err(store_err)
}
