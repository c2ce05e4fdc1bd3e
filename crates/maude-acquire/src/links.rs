use anyhow::{Context, Result};
use maude_model::{LinkError, MdrId};
use std::path::Path;
use url::Url;

/// Query parameter carrying the report key on MAUDE detail pages.
pub const ID_PARAM: &str = "MDRFOI__ID";

/// Read a batch links file and extract the MDR identifiers, in file order.
///
/// Lines that are blank or don't start with `https://` are ignored. URL lines
/// without an identifier are logged and skipped; they never fail the parse.
pub fn parse_batch_links(path: &Path) -> Result<Vec<MdrId>> {
    tracing::info!(path = %path.display(), "Reading batch links");
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch links file {}", path.display()))?;

    let (ids, problems) = extract_ids(&text);
    for problem in &problems {
        match problem {
            LinkError::MissingId { .. } => tracing::warn!("{problem}"),
            LinkError::InvalidUrl { .. } => tracing::error!("{problem}"),
        }
    }

    tracing::info!(ids = ids.len(), skipped = problems.len(), "Extracted MDRFOI__ID values");
    Ok(ids)
}

/// Pull identifiers out of batch-links text. Returns the identifiers and the
/// URL lines that could not produce one.
pub fn extract_ids(text: &str) -> (Vec<MdrId>, Vec<LinkError>) {
    let mut ids = Vec::new();
    let mut problems = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let line_num = index + 1;
        let line = line.trim();
        if line.is_empty() || !line.starts_with("https://") {
            continue;
        }

        match id_from_url(line) {
            Ok(Some(id)) => ids.push(id),
            Ok(None) => problems.push(LinkError::MissingId {
                line: line_num,
                url: line.to_string(),
            }),
            Err(source) => problems.push(LinkError::InvalidUrl {
                line: line_num,
                source,
            }),
        }
    }

    (ids, problems)
}

/// First non-blank `MDRFOI__ID` value in the URL's query string.
fn id_from_url(raw: &str) -> Result<Option<MdrId>, url::ParseError> {
    let url = Url::parse(raw)?;
    let id = url
        .query_pairs()
        .filter(|(k, v)| k == ID_PARAM && !v.is_empty())
        .find_map(|(_, v)| MdrId::new(v.into_owned()));
    Ok(id)
}
