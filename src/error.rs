use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field or key segment that caused the error (e.g., "filters.region", "segment[1]")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, offending pair)
    pub details: Option<String>,
    /// Component that raised the error (e.g., "key_codec", "tiered_cache")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the query cache.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Key encoding error: {message}{}", format_context(.context))]
    KeyEncoding {
        message: String,
        context: ErrorContext,
    },

    #[error("Query reconstruction is not supported for key '{key}'")]
    ReconstructionUnsupported { key: String },

    #[error("Malformed cache key: {message}{}", format_context(.context))]
    MalformedKey {
        message: String,
        context: ErrorContext,
    },

    #[error("Cache tier '{tier}' failed: {message}{}", format_context(.context))]
    Tier {
        tier: String,
        message: String,
        context: ErrorContext,
    },

    #[error("Origin '{source_name}' failed: {source}")]
    Origin {
        source_name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("All data sources failed ({attempted} attempted)")]
    AllSourcesExhausted { attempted: usize },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    pub fn key_encoding_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::KeyEncoding {
            message: msg.into(),
            context,
        }
    }

    pub fn malformed_key_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::MalformedKey {
            message: msg.into(),
            context,
        }
    }

    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Create a tier failure; tier implementations use this for backend errors.
    pub fn tier(tier: impl Into<String>, msg: impl Into<String>) -> Self {
        Error::Tier {
            tier: tier.into(),
            message: msg.into(),
            context: ErrorContext::new().with_source("cache_tier"),
        }
    }

    /// Wrap an arbitrary failure raised by an origin data source.
    pub fn origin(source_name: impl Into<String>, err: impl Into<anyhow::Error>) -> Self {
        Error::Origin {
            source_name: source_name.into(),
            source: err.into(),
        }
    }

    pub fn reconstruction_unsupported(key: impl Into<String>) -> Self {
        Error::ReconstructionUnsupported { key: key.into() }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::KeyEncoding { context, .. }
            | Error::MalformedKey { context, .. }
            | Error::Tier { context, .. }
            | Error::Configuration { context, .. } => Some(context),
            _ => None,
        }
    }

    /// True when every origin in a fallback chain failed.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Error::AllSourcesExhausted { .. })
    }
}
