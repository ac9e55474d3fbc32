#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/quartzrow/ingest/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! SQLite target store and idempotent upsert engine.
//!
//! [`MetricStore`] owns the three tables of the data model — `companies`,
//! `financial_metrics`, `sec_filings` — and exposes:
//!
//! - a company registry with a tagged lookup
//!   ([`CompanyLookup`]) so callers can tell canonical rows, placeholder
//!   rows, and misses apart without string matching;
//! - [`MetricStore::upsert_metric`], the natural-key idempotent upsert;
//! - [`MetricStore::record_filing`], which auto-creates a tagged
//!   placeholder company when a filing arrives for an unknown CIK;
//! - the merge engine in [`merge`], which collapses placeholder duplicates
//!   back into their canonical companies.

use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, instrument};

use ingest_core::{
    Cik, CompanyId, CompanyRef, IngestError, MetricObservation, MetricType, PeriodType, RawFiling,
    Result, Ticker,
};

/// Entity resolution and merge engine.
pub mod merge;

pub use merge::{MergeOverride, MergeReport};

/// Result of looking a company up by identifier.
///
/// Placeholder rows are tagged explicitly rather than inferred from the
/// "Company CIK ..." name pattern, so the merge engine's preconditions stay
/// queryable.
#[derive(Clone, Debug, PartialEq)]
pub enum CompanyLookup {
    /// A canonical (ticker-keyed) company row.
    Found(StoredCompany),
    /// A placeholder row auto-created from a filings provider's CIK.
    FoundPlaceholder(StoredCompany),
    /// No row holds this identifier.
    NotFound,
}

/// Result of an idempotent metric upsert.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No row existed for the natural key; one was inserted.
    Inserted,
    /// A row existed and at least one of value/unit/source differed.
    Updated,
    /// A row existed and nothing differed; `updated_at` was left untouched.
    Unchanged,
}

/// A company row as stored.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredCompany {
    /// Surrogate key.
    pub id: CompanyId,
    /// Exchange ticker; null for placeholder rows.
    pub ticker: Option<Ticker>,
    /// Company name ("Company CIK <value>" for placeholders).
    pub name: String,
    /// Confirmed regulatory filer identifier, if any.
    pub cik: Option<Cik>,
    /// Business sector, if known.
    pub sector: Option<String>,
    /// Subsector/category, if known.
    pub category: Option<String>,
    /// Whether this row was auto-created from an unknown CIK.
    pub is_placeholder: bool,
}

impl StoredCompany {
    /// The reference shape the orchestrator hands to connectors.
    #[must_use]
    pub fn to_ref(&self) -> CompanyRef {
        CompanyRef {
            id: self.id,
            ticker: self.ticker.clone(),
            cik: self.cik.clone(),
            name: self.name.clone(),
        }
    }
}

/// A metric row as stored.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredMetric {
    /// Owning company.
    pub company_id: CompanyId,
    /// Which metric.
    pub metric_type: MetricType,
    /// Period end date.
    pub metric_date: NaiveDate,
    /// Quarterly or annual.
    pub period_type: PeriodType,
    /// Observed value (signed).
    pub value: f64,
    /// Unit string as stored.
    pub unit: String,
    /// Provider identifier that produced the current value.
    pub source: String,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 last-update timestamp.
    pub updated_at: String,
}

/// Result of recording one filing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FilingRecorded {
    /// Company the filing was attached to.
    pub company_id: CompanyId,
    /// Whether a placeholder company was auto-created for the CIK.
    pub created_placeholder: bool,
    /// False when the accession number was already on file.
    pub inserted: bool,
}

/// SQLite-backed target store.
///
/// The connection is guarded by a mutex; in-process callers are serialized,
/// and every multi-statement operation runs inside an explicit transaction
/// so a concurrent process never observes a half-written row.
#[derive(Debug)]
pub struct MetricStore {
    conn: Mutex<Connection>,
}

impl MetricStore {
    /// Opens (or creates) a store at the given path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or schema creation
    /// fails.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| IngestError::Store(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Creates an in-memory store.
    ///
    /// Useful for testing; data is lost when the store is dropped.
    ///
    /// # Errors
    /// Returns an error if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| IngestError::Store(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            // UNIQUE permits any number of NULL tickers (placeholders)
            // while keeping at most one active row per real ticker
            "CREATE TABLE IF NOT EXISTS companies (
                id INTEGER PRIMARY KEY,
                ticker TEXT UNIQUE,
                name TEXT NOT NULL,
                cik TEXT,
                sector TEXT,
                category TEXT,
                is_placeholder INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| IngestError::Store(e.to_string()))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_companies_cik ON companies(cik)",
            [],
        )
        .map_err(|e| IngestError::Store(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS financial_metrics (
                id INTEGER PRIMARY KEY,
                company_id INTEGER NOT NULL REFERENCES companies(id),
                metric_type TEXT NOT NULL,
                metric_date TEXT NOT NULL,
                period_type TEXT NOT NULL,
                value REAL NOT NULL,
                unit TEXT NOT NULL,
                source TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (company_id, metric_type, metric_date, period_type)
            )",
            [],
        )
        .map_err(|e| IngestError::Store(e.to_string()))?;

        // Range queries over (company, metric, date)
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_metrics_company_type_date
             ON financial_metrics(company_id, metric_type, metric_date)",
            [],
        )
        .map_err(|e| IngestError::Store(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sec_filings (
                id INTEGER PRIMARY KEY,
                company_id INTEGER NOT NULL REFERENCES companies(id),
                filing_type TEXT NOT NULL,
                filing_date TEXT NOT NULL,
                accession_no TEXT NOT NULL UNIQUE,
                processing_status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| IngestError::Store(e.to_string()))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_filings_company ON sec_filings(company_id)",
            [],
        )
        .map_err(|e| IngestError::Store(e.to_string()))?;

        debug!("store schema initialized");
        Ok(())
    }

    pub(crate) fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| IngestError::Store(e.to_string()))
    }

    /// Registers (or refreshes) a ticker-keyed company from the universe.
    ///
    /// Idempotent on the ticker: a second call with the same ticker updates
    /// name/sector/category on the existing row and returns the same id.
    #[instrument(skip(self), fields(ticker = %ticker))]
    pub fn ensure_company(
        &self,
        ticker: &Ticker,
        name: &str,
        sector: Option<&str>,
        category: Option<&str>,
    ) -> Result<StoredCompany> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO companies (ticker, name, sector, category, is_placeholder, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)
             ON CONFLICT(ticker) DO UPDATE SET
                 name = excluded.name,
                 sector = COALESCE(excluded.sector, companies.sector),
                 category = COALESCE(excluded.category, companies.category),
                 updated_at = excluded.updated_at",
            params![ticker.as_str(), name, sector, category, now],
        )
        .map_err(|e| IngestError::Store(e.to_string()))?;

        Self::company_by_ticker(&conn, ticker)?
            .ok_or_else(|| IngestError::Store(format!("company {ticker} missing after upsert")))
    }

    /// Looks a company up by ticker.
    pub fn lookup_by_ticker(&self, ticker: &Ticker) -> Result<CompanyLookup> {
        let conn = self.lock()?;
        Ok(match Self::company_by_ticker(&conn, ticker)? {
            Some(c) if c.is_placeholder => CompanyLookup::FoundPlaceholder(c),
            Some(c) => CompanyLookup::Found(c),
            None => CompanyLookup::NotFound,
        })
    }

    /// Looks a company up by CIK.
    ///
    /// When both a canonical row and a placeholder hold the CIK (the window
    /// between confirmation and the next merge run), the canonical row wins.
    pub fn lookup_by_cik(&self, cik: &Cik) -> Result<CompanyLookup> {
        let conn = self.lock()?;
        Ok(match Self::company_by_cik(&conn, cik)? {
            Some(c) if c.is_placeholder => CompanyLookup::FoundPlaceholder(c),
            Some(c) => CompanyLookup::Found(c),
            None => CompanyLookup::NotFound,
        })
    }

    /// Fetches a company row by id.
    pub fn company(&self, id: CompanyId) -> Result<Option<StoredCompany>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, ticker, name, cik, sector, category, is_placeholder
             FROM companies WHERE id = ?1",
            params![id.0],
            Self::map_company,
        )
        .optional()
        .map_err(|e| IngestError::Store(e.to_string()))
    }

    /// All ticker-keyed companies, for universe queries.
    pub fn companies(&self) -> Result<Vec<StoredCompany>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, ticker, name, cik, sector, category, is_placeholder
                 FROM companies WHERE is_placeholder = 0 ORDER BY ticker",
            )
            .map_err(|e| IngestError::Store(e.to_string()))?;
        let rows = stmt
            .query_map([], Self::map_company)
            .map_err(|e| IngestError::Store(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| IngestError::Store(e.to_string()))
    }

    /// Records a confirmed ticker↔CIK association on a canonical company.
    ///
    /// Leaves an already-confirmed CIK in place; issuers keep their primary
    /// CIK and historical ones arrive as merge overrides instead.
    #[instrument(skip(self), fields(company = %id, cik = %cik))]
    pub fn confirm_cik(&self, id: CompanyId, cik: &Cik) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        conn.execute(
            "UPDATE companies SET cik = ?1, updated_at = ?2
             WHERE id = ?3 AND cik IS NULL",
            params![cik.as_str(), now, id.0],
        )
        .map_err(|e| IngestError::Store(e.to_string()))?;
        Ok(())
    }

    /// Idempotent natural-key upsert of one metric observation.
    ///
    /// The write is a single `INSERT ... ON CONFLICT DO UPDATE` whose update
    /// arm only fires when value, unit, or source differ, so re-ingesting
    /// identical data never touches `updated_at`. The existence probe that
    /// classifies the outcome runs inside the same transaction as the write.
    #[instrument(skip(self, observation), fields(company = %company_id, metric = %observation.metric_type, date = %observation.metric_date))]
    pub fn upsert_metric(
        &self,
        company_id: CompanyId,
        observation: &MetricObservation,
        source: &str,
    ) -> Result<UpsertOutcome> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| IngestError::Store(e.to_string()))?;

        let existed: bool = tx
            .query_row(
                "SELECT EXISTS(
                     SELECT 1 FROM financial_metrics
                     WHERE company_id = ?1 AND metric_type = ?2
                       AND metric_date = ?3 AND period_type = ?4
                 )",
                params![
                    company_id.0,
                    observation.metric_type.as_str(),
                    observation.metric_date.to_string(),
                    observation.period_type.as_str()
                ],
                |row| row.get(0),
            )
            .map_err(|e| IngestError::Store(e.to_string()))?;

        let changed = tx
            .execute(
                "INSERT INTO financial_metrics
                     (company_id, metric_type, metric_date, period_type,
                      value, unit, source, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                 ON CONFLICT(company_id, metric_type, metric_date, period_type)
                 DO UPDATE SET
                     value = excluded.value,
                     unit = excluded.unit,
                     source = excluded.source,
                     updated_at = excluded.updated_at
                 WHERE financial_metrics.value IS NOT excluded.value
                    OR financial_metrics.unit IS NOT excluded.unit
                    OR financial_metrics.source IS NOT excluded.source",
                params![
                    company_id.0,
                    observation.metric_type.as_str(),
                    observation.metric_date.to_string(),
                    observation.period_type.as_str(),
                    observation.value,
                    observation.unit.as_str(),
                    source,
                    now
                ],
            )
            .map_err(|e| IngestError::Store(e.to_string()))?;

        tx.commit().map_err(|e| IngestError::Store(e.to_string()))?;

        let outcome = if !existed {
            UpsertOutcome::Inserted
        } else if changed > 0 {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Unchanged
        };
        debug!(?outcome, "metric upsert");
        Ok(outcome)
    }

    /// Fetches one stored metric by natural key.
    pub fn metric(
        &self,
        company_id: CompanyId,
        metric_type: MetricType,
        metric_date: NaiveDate,
        period_type: PeriodType,
    ) -> Result<Option<StoredMetric>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT company_id, metric_type, metric_date, period_type,
                    value, unit, source, created_at, updated_at
             FROM financial_metrics
             WHERE company_id = ?1 AND metric_type = ?2
               AND metric_date = ?3 AND period_type = ?4",
            params![
                company_id.0,
                metric_type.as_str(),
                metric_date.to_string(),
                period_type.as_str()
            ],
            Self::map_metric,
        )
        .optional()
        .map_err(|e| IngestError::Store(e.to_string()))
    }

    /// Number of metric rows stored for a company.
    pub fn metric_count(&self, company_id: CompanyId) -> Result<u64> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT COUNT(*) FROM financial_metrics WHERE company_id = ?1",
            params![company_id.0],
            |row| row.get(0),
        )
        .map_err(|e| IngestError::Store(e.to_string()))
    }

    /// Records one filing, attaching it to the company holding the CIK.
    ///
    /// When no company holds the CIK, a placeholder row named
    /// "Company CIK <value>" is created and tagged, to be collapsed by a
    /// later merge run. Idempotent on the accession number.
    #[instrument(skip(self, filing), fields(cik = %cik, accession = %filing.accession_no))]
    pub fn record_filing(&self, cik: &Cik, filing: &RawFiling) -> Result<FilingRecorded> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| IngestError::Store(e.to_string()))?;

        let existing = Self::company_by_cik(&tx, cik)?;
        let (company_id, created_placeholder) = match existing {
            Some(company) => (company.id, false),
            None => {
                tx.execute(
                    "INSERT INTO companies (name, cik, is_placeholder, created_at, updated_at)
                     VALUES (?1, ?2, 1, ?3, ?3)",
                    params![format!("Company CIK {}", cik.as_str()), cik.as_str(), now],
                )
                .map_err(|e| IngestError::Store(e.to_string()))?;
                debug!("created placeholder company for unknown CIK");
                (CompanyId(tx.last_insert_rowid()), true)
            }
        };

        let inserted = tx
            .execute(
                "INSERT INTO sec_filings
                     (company_id, filing_type, filing_date, accession_no, processing_status, created_at)
                 VALUES (?1, ?2, ?3, ?4, 'pending', ?5)
                 ON CONFLICT(accession_no) DO NOTHING",
                params![
                    company_id.0,
                    filing.filing_type,
                    filing.filing_date.to_string(),
                    filing.accession_no,
                    now
                ],
            )
            .map_err(|e| IngestError::Store(e.to_string()))?;

        tx.commit().map_err(|e| IngestError::Store(e.to_string()))?;

        Ok(FilingRecorded {
            company_id,
            created_placeholder,
            inserted: inserted > 0,
        })
    }

    /// Number of filings attached to a company.
    pub fn filing_count(&self, company_id: CompanyId) -> Result<u64> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT COUNT(*) FROM sec_filings WHERE company_id = ?1",
            params![company_id.0],
            |row| row.get(0),
        )
        .map_err(|e| IngestError::Store(e.to_string()))
    }

    /// Total filings across all companies.
    pub fn total_filing_count(&self) -> Result<u64> {
        let conn = self.lock()?;
        conn.query_row("SELECT COUNT(*) FROM sec_filings", [], |row| row.get(0))
            .map_err(|e| IngestError::Store(e.to_string()))
    }

    fn company_by_ticker(conn: &Connection, ticker: &Ticker) -> Result<Option<StoredCompany>> {
        conn.query_row(
            "SELECT id, ticker, name, cik, sector, category, is_placeholder
             FROM companies WHERE ticker = ?1",
            params![ticker.as_str()],
            Self::map_company,
        )
        .optional()
        .map_err(|e| IngestError::Store(e.to_string()))
    }

    fn company_by_cik(conn: &Connection, cik: &Cik) -> Result<Option<StoredCompany>> {
        // Canonical rows shadow placeholders holding the same CIK
        conn.query_row(
            "SELECT id, ticker, name, cik, sector, category, is_placeholder
             FROM companies WHERE cik = ?1
             ORDER BY is_placeholder ASC, id ASC LIMIT 1",
            params![cik.as_str()],
            Self::map_company,
        )
        .optional()
        .map_err(|e| IngestError::Store(e.to_string()))
    }

    fn map_company(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredCompany> {
        Ok(StoredCompany {
            id: CompanyId(row.get(0)?),
            ticker: row.get::<_, Option<String>>(1)?.map(Ticker::new),
            name: row.get(2)?,
            cik: row.get::<_, Option<String>>(3)?.map(Cik::new),
            sector: row.get(4)?,
            category: row.get(5)?,
            is_placeholder: row.get(6)?,
        })
    }

    fn map_metric(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMetric> {
        let metric_type: String = row.get(1)?;
        let metric_date: String = row.get(2)?;
        let period_type: String = row.get(3)?;
        Ok(StoredMetric {
            company_id: CompanyId(row.get(0)?),
            metric_type: metric_type.parse().map_err(|e: IngestError| {
                rusqlite::Error::FromSqlConversionFailure(
                    1,
                    rusqlite::types::Type::Text,
                    Box::new(std::io::Error::other(e.to_string())),
                )
            })?,
            metric_date: metric_date.parse().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?,
            period_type: period_type.parse().map_err(|e: IngestError| {
                rusqlite::Error::FromSqlConversionFailure(
                    3,
                    rusqlite::types::Type::Text,
                    Box::new(std::io::Error::other(e.to_string())),
                )
            })?,
            value: row.get(4)?,
            unit: row.get(5)?,
            source: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}
