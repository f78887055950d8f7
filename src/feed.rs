//! CA metadata feed
//!
//! Reads the CCADB intermediate certificate report (CSV) and turns every row
//! into a [`FeedRecord`] naming the CRLs that CA publishes.

use std::collections::HashMap;
use std::io::Read;

use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const FIELD_ISSUER: &str = "Issuer";
pub const FIELD_SUBJECT: &str = "Subject";
pub const FIELD_FULL_CRL: &str = "Full CRL Issued By This CA";
/// Despite the name, the column is not always valid JSON.
pub const FIELD_PARTITIONED: &str = "JSON Array of Partitioned CRLs";

/// Feed-related errors
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed download returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing required column in feed: {0}")]
    MissingColumn(&'static str),

    #[error("Row {line}: {reason}")]
    MalformedRow { line: u64, reason: String },

    #[error("No URLs found in partitioned CRL list {0:?}")]
    NoPartitionedUrls(String),
}

pub type FeedResult<T> = Result<T, FeedError>;

/// One CA from the feed and the CRLs it publishes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRecord {
    pub issuer: String,
    pub subject: String,
    /// `O=` attribute of the issuer DN
    pub organization: String,
    /// `CN=` attribute of the subject DN
    pub common_name: String,
    pub full_crl_url: Option<String>,
    pub partitioned_crl_urls: Vec<String>,
}

impl FeedRecord {
    /// Every CRL URL of this record, full CRL first.
    pub fn crl_urls(&self) -> impl Iterator<Item = &str> {
        self.full_crl_url
            .iter()
            .map(String::as_str)
            .chain(self.partitioned_crl_urls.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, Copy)]
struct Columns {
    issuer: usize,
    subject: usize,
    full_crl: usize,
    partitioned: usize,
}

/// Streaming reader over the feed CSV.
pub struct FeedReader<R: Read> {
    reader: csv::Reader<R>,
    columns: Columns,
}

impl<R: Read> FeedReader<R> {
    /// Read the header row and locate the required columns.
    ///
    /// A missing column is fatal: without it no row can be interpreted.
    pub fn new(data: R) -> FeedResult<Self> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(data);

        let index: HashMap<String, usize> = reader
            .headers()?
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_string(), i))
            .collect();

        let column = |name: &'static str| {
            index
                .get(name)
                .copied()
                .ok_or(FeedError::MissingColumn(name))
        };

        let columns = Columns {
            issuer: column(FIELD_ISSUER)?,
            subject: column(FIELD_SUBJECT)?,
            full_crl: column(FIELD_FULL_CRL)?,
            partitioned: column(FIELD_PARTITIONED)?,
        };

        Ok(Self { reader, columns })
    }

    /// Iterate over the rows. Each malformed row yields its own error so the
    /// caller can log it and carry on.
    pub fn records(self) -> impl Iterator<Item = FeedResult<FeedRecord>> {
        let columns = self.columns;
        self.reader
            .into_records()
            .map(move |row| parse_row(&row?, columns))
    }
}

impl FeedReader<std::io::Cursor<Vec<u8>>> {
    /// Download the feed and prepare a reader over it.
    pub async fn download(client: &Client, url: &str) -> FeedResult<Self> {
        info!("Downloading CA metadata feed from {}", url);

        let response = client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FeedError::Status(response.status()));
        }

        let body = response.bytes().await?.to_vec();
        debug!("Feed download complete ({} bytes)", body.len());
        Self::new(std::io::Cursor::new(body))
    }
}

fn parse_row(row: &csv::StringRecord, columns: Columns) -> FeedResult<FeedRecord> {
    let line = row.position().map(|p| p.line()).unwrap_or_default();
    let field = |idx: usize| {
        row.get(idx)
            .map(str::trim)
            .ok_or_else(|| FeedError::MalformedRow {
                line,
                reason: format!("row has only {} fields", row.len()),
            })
    };

    let issuer = field(columns.issuer)?.to_string();
    let subject = field(columns.subject)?.to_string();
    let full_crl = field(columns.full_crl)?;
    let partitioned = field(columns.partitioned)?;

    let full_crl_url = (!full_crl.is_empty()).then(|| full_crl.to_string());

    let partitioned_crl_urls = match parse_partitioned_urls(partitioned) {
        Ok(urls) => urls,
        // A usable full CRL keeps the row alive
        Err(e) if full_crl_url.is_some() => {
            warn!("Row {line}: ignoring partitioned CRL list for {issuer}: {e}");
            Vec::new()
        }
        Err(e) => {
            return Err(FeedError::MalformedRow {
                line,
                reason: e.to_string(),
            });
        }
    };

    let (_, organization) = parse_dn(&issuer);
    let (common_name, _) = parse_dn(&subject);

    Ok(FeedRecord {
        issuer,
        subject,
        organization,
        common_name,
        full_crl_url,
        partitioned_crl_urls,
    })
}

/// Parse the partitioned CRL column.
///
/// Accepts a JSON array of strings as well as the bracketed, unquoted list the
/// feed frequently contains. `[]` and the empty string mean "nothing to fetch".
pub fn parse_partitioned_urls(raw: &str) -> FeedResult<Vec<String>> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "[]" {
        return Ok(Vec::new());
    }

    if let Ok(urls) = serde_json::from_str::<Vec<String>>(raw) {
        let urls: Vec<String> = urls
            .into_iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect();
        return Ok(urls);
    }

    let inner = raw.strip_prefix('[').unwrap_or(raw);
    let inner = inner.strip_suffix(']').unwrap_or(inner);
    let urls: Vec<String> = inner
        .split(',')
        .map(|part| part.trim().trim_matches('"').trim())
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect();

    if urls.is_empty() {
        return Err(FeedError::NoPartitionedUrls(raw.to_string()));
    }
    Ok(urls)
}

/// Extract the `CN=` and `O=` attributes from a DN string.
///
/// Attributes are separated by `,` or `;`. Missing attributes are returned
/// as empty strings.
pub fn parse_dn(dn: &str) -> (String, String) {
    let mut cn = String::new();
    let mut org = String::new();
    for part in dn.split([',', ';']).map(str::trim) {
        if let Some(value) = part.strip_prefix("CN=") {
            cn = value.to_string();
        } else if let Some(value) = part.strip_prefix("O=") {
            org = value.to_string();
        }
    }
    (cn, org)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HEADER: &str = "Subject,Issuer,Full CRL Issued By This CA,JSON Array of Partitioned CRLs\n";

    fn read(csv: &str) -> Vec<FeedResult<FeedRecord>> {
        FeedReader::new(Cursor::new(csv.as_bytes().to_vec()))
            .unwrap()
            .records()
            .collect()
    }

    #[test]
    fn test_partitioned_unquoted_and_json_agree() {
        let expected = vec!["http://a/x.crl".to_string(), "http://b/y.crl".to_string()];
        assert_eq!(
            parse_partitioned_urls("[http://a/x.crl, http://b/y.crl]").unwrap(),
            expected
        );
        assert_eq!(
            parse_partitioned_urls(r#"["http://a/x.crl","http://b/y.crl"]"#).unwrap(),
            expected
        );
    }

    #[test]
    fn test_partitioned_empty_is_nothing_to_fetch() {
        assert!(parse_partitioned_urls("[]").unwrap().is_empty());
        assert!(parse_partitioned_urls("").unwrap().is_empty());
        assert!(parse_partitioned_urls("  [] ").unwrap().is_empty());
    }

    #[test]
    fn test_partitioned_without_urls_is_rejected() {
        assert!(matches!(
            parse_partitioned_urls("[ , ,]"),
            Err(FeedError::NoPartitionedUrls(_))
        ));
    }

    #[test]
    fn test_partitioned_half_quoted() {
        let urls = parse_partitioned_urls(r#"["http://a/x.crl", http://b/y.crl]"#).unwrap();
        assert_eq!(urls, vec!["http://a/x.crl", "http://b/y.crl"]);
    }

    #[test]
    fn test_parse_dn() {
        let (cn, org) = parse_dn("CN=Example Issuing CA; O=Example Corp; C=US");
        assert_eq!(cn, "Example Issuing CA");
        assert_eq!(org, "Example Corp");

        let (cn, org) = parse_dn("C=US");
        assert!(cn.is_empty());
        assert!(org.is_empty());
    }

    #[test]
    fn test_missing_column_is_fatal() {
        let csv = "Subject,Issuer,Full CRL Issued By This CA\n";
        let result = FeedReader::new(Cursor::new(csv.as_bytes().to_vec()));
        assert!(matches!(
            result,
            Err(FeedError::MissingColumn(FIELD_PARTITIONED))
        ));
    }

    #[test]
    fn test_read_records() {
        let csv = format!(
            "{HEADER}\
             \"CN=Sub CA 1, O=Example\",\"CN=Root, O=Example Inc\",http://crl.example/full.crl,[]\n\
             \"CN=Sub CA 2\",\"O=Other\",,\"[http://crl.other/1.crl, http://crl.other/2.crl]\"\n"
        );
        let records: Vec<FeedRecord> = read(&csv).into_iter().map(Result::unwrap).collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].common_name, "Sub CA 1");
        assert_eq!(records[0].organization, "Example Inc");
        assert_eq!(
            records[0].full_crl_url.as_deref(),
            Some("http://crl.example/full.crl")
        );
        assert!(records[0].partitioned_crl_urls.is_empty());

        assert!(records[1].full_crl_url.is_none());
        assert_eq!(
            records[1].crl_urls().collect::<Vec<_>>(),
            vec!["http://crl.other/1.crl", "http://crl.other/2.crl"]
        );
    }

    #[test]
    fn test_bad_partitioned_list_keeps_full_crl() {
        let csv = format!("{HEADER}\"CN=Sub\",\"O=Org\",http://crl.example/full.crl,\"[,]\"\n");
        let records = read(&csv);
        let record = records[0].as_ref().unwrap();
        assert_eq!(record.crl_urls().count(), 1);
    }

    #[test]
    fn test_row_without_usable_urls_is_rejected() {
        let csv = format!("{HEADER}\"CN=Sub\",\"O=Org\",,\"[,]\"\n");
        let records = read(&csv);
        assert!(matches!(records[0], Err(FeedError::MalformedRow { .. })));
    }

    #[test]
    fn test_short_row_is_rejected() {
        let csv = format!("{HEADER}\"CN=Sub\",\"O=Org\"\n");
        let records = read(&csv);
        assert!(matches!(records[0], Err(FeedError::MalformedRow { .. })));
    }
}
