//! Parsing of newline-delimited telemetry artifacts

use std::borrow::Cow;
use std::io::Read;

use dispatcher_server_domain::{
    CorrelationId, DomainError, RequestFlavor, Result, RunnerEvent, SatEvent, TelemetryBatch,
};
use flate2::read::GzDecoder;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::schema::SchemaValidator;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Inflate gzip data; everything else passes through untouched
pub fn decode_artifact(data: &[u8]) -> Result<Cow<'_, [u8]>> {
    if !data.starts_with(&GZIP_MAGIC) {
        return Ok(Cow::Borrowed(data));
    }

    let mut decoded = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut decoded)
        .map_err(|e| DomainError::validation(format!("failed to decompress artifact: {}", e)))?;
    Ok(Cow::Owned(decoded))
}

/// A batch that passed every check, with the run it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedArtifact {
    pub batch: TelemetryBatch,
    pub correlation_id: CorrelationId,
}

/// Validate every record of `data` against the schema of `flavor`.
///
/// `data` may be gzip-compressed. A single bad record rejects the whole
/// artifact.
pub fn validate_content(
    schemas: &SchemaValidator,
    flavor: RequestFlavor,
    data: &[u8],
) -> Result<ValidatedArtifact> {
    let data = decode_artifact(data)?;
    let text = std::str::from_utf8(&data)
        .map_err(|e| DomainError::validation(format!("artifact is not UTF-8: {}", e)))?;

    let batch = match flavor {
        RequestFlavor::Runner => TelemetryBatch::Runner(parse_records::<RunnerEvent>(
            schemas, flavor, text,
        )?),
        RequestFlavor::Satellite => {
            TelemetryBatch::Satellite(parse_records::<SatEvent>(schemas, flavor, text)?)
        }
    };

    if batch.is_empty() {
        return Err(DomainError::validation("No events found"));
    }

    let correlation_id = batch
        .correlation_id()
        .ok_or_else(|| DomainError::validation("Correlation id not found"))?;

    Ok(ValidatedArtifact {
        batch,
        correlation_id,
    })
}

fn parse_records<E: DeserializeOwned>(
    schemas: &SchemaValidator,
    flavor: RequestFlavor,
    text: &str,
) -> Result<Vec<E>> {
    text.split('\n')
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            let record: Value = serde_json::from_str(line).map_err(|e| {
                DomainError::validation(format!("line {}: invalid JSON: {}", index + 1, e))
            })?;

            schemas.validate(flavor, &record).map_err(|e| {
                DomainError::validation(format!("line {}: {}", index + 1, e))
            })?;

            serde_json::from_value(record).map_err(|e| {
                DomainError::validation(format!("line {}: {}", index + 1, e))
            })
        })
        .collect()
}
