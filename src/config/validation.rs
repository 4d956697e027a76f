use super::models::{Config, StorageProvider};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("max_payload_bytes ({actual}) exceeds the hard ceiling of {limit} bytes")]
    PayloadSizeExceedsCeiling { actual: u64, limit: u64 },

    #[error("storage provider is r2 but missing credentials (access_key or secret_key)")]
    MissingR2Credentials,

    #[error("retention TTL must be positive: {field} = {value}")]
    InvalidRetentionTTL { field: String, value: u32 },

    #[error("ledger_max_bytes must be positive")]
    InvalidLedgerMaxBytes,

    #[error("similarity.k must be positive")]
    InvalidSimilarityK,

    #[error("publisher.concurrency must be positive")]
    InvalidPublisherConcurrency,

    #[error("publisher.max_file_size_bytes must be positive")]
    InvalidPublisherMaxFileSize,

    #[error("media.sizes must not be empty")]
    NoMediaSizesConfigured,

    #[error("media.formats must not be empty")]
    NoMediaFormatsConfigured,

    #[error("job.hard_timeout_secs ({hard}) must be >= job.soft_timeout_secs ({soft})")]
    HardTimeoutBeforeSoftTimeout { soft: u64, hard: u64 },
}

/// Validate the entire configuration tree.
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_payload_size(config)?;
    validate_storage(config)?;
    validate_retention(config)?;
    validate_similarity(config)?;
    validate_publisher(config)?;
    validate_media(config)?;
    validate_job(config)?;
    Ok(())
}

/// `max_payload_bytes` is bounded generously (spec §6a request size limiting)
/// but must still be sane; 256MB comfortably covers any vault manifest.
fn validate_payload_size(config: &Config) -> Result<(), ValidationError> {
    const HARD_CEILING_BYTES: u64 = 256 * 1024 * 1024;

    if config.server.max_payload_bytes.as_u64() > HARD_CEILING_BYTES {
        return Err(ValidationError::PayloadSizeExceedsCeiling {
            actual: config.server.max_payload_bytes.as_u64(),
            limit: HARD_CEILING_BYTES,
        });
    }

    Ok(())
}

fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    if config.storage.provider == StorageProvider::R2
        && (config.storage.access_key.is_none() || config.storage.secret_key.is_none())
    {
        return Err(ValidationError::MissingR2Credentials);
    }

    Ok(())
}

fn validate_retention(config: &Config) -> Result<(), ValidationError> {
    if config.retention.job_ttl_days == 0 {
        return Err(ValidationError::InvalidRetentionTTL {
            field: "job_ttl_days".to_string(),
            value: 0,
        });
    }

    if config.retention.logs_ttl_days == 0 {
        return Err(ValidationError::InvalidRetentionTTL {
            field: "logs_ttl_days".to_string(),
            value: 0,
        });
    }

    if config.retention.ledger_max_bytes.as_u64() == 0 {
        return Err(ValidationError::InvalidLedgerMaxBytes);
    }

    Ok(())
}

fn validate_similarity(config: &Config) -> Result<(), ValidationError> {
    if config.similarity.k == 0 {
        return Err(ValidationError::InvalidSimilarityK);
    }
    Ok(())
}

fn validate_publisher(config: &Config) -> Result<(), ValidationError> {
    if config.publisher.concurrency == 0 {
        return Err(ValidationError::InvalidPublisherConcurrency);
    }
    if config.publisher.max_file_size_bytes.as_u64() == 0 {
        return Err(ValidationError::InvalidPublisherMaxFileSize);
    }
    Ok(())
}

fn validate_media(config: &Config) -> Result<(), ValidationError> {
    if config.media.sizes.is_empty() {
        return Err(ValidationError::NoMediaSizesConfigured);
    }
    if config.media.formats.is_empty() {
        return Err(ValidationError::NoMediaFormatsConfigured);
    }
    Ok(())
}

fn validate_job(config: &Config) -> Result<(), ValidationError> {
    if config.job.hard_timeout_secs < config.job.soft_timeout_secs {
        return Err(ValidationError::HardTimeoutBeforeSoftTimeout {
            soft: config.job.soft_timeout_secs,
            hard: config.job.hard_timeout_secs,
        });
    }
    Ok(())
}
