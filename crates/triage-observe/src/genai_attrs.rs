//! OpenTelemetry GenAI Semantic Convention attribute constants.
//!
//! Span fields are declared with dotted identifiers in `info_span!`; these
//! constants name the same fields for `Span::record` once a response
//! arrives.

// --- Required attributes ---

/// The name of the operation being performed (e.g., "route", "answer").
pub const GEN_AI_OPERATION_NAME: &str = "gen_ai.operation.name";

/// The name of the GenAI provider (e.g., "openai").
pub const GEN_AI_PROVIDER_NAME: &str = "gen_ai.provider.name";

// --- Recommended attributes ---

/// The model ID requested.
pub const GEN_AI_REQUEST_MODEL: &str = "gen_ai.request.model";

/// The maximum number of output tokens requested.
pub const GEN_AI_REQUEST_MAX_TOKENS: &str = "gen_ai.request.max_tokens";

/// The number of input tokens consumed.
pub const GEN_AI_USAGE_INPUT_TOKENS: &str = "gen_ai.usage.input_tokens";

/// The number of output tokens generated.
pub const GEN_AI_USAGE_OUTPUT_TOKENS: &str = "gen_ai.usage.output_tokens";

/// The finish reason for the response (e.g., "end_turn", "max_tokens").
pub const GEN_AI_RESPONSE_FINISH_REASONS: &str = "gen_ai.response.finish_reasons";

// --- Cascade-specific attributes ---

/// 1-based heavy-stage attempt number within one cascade.
pub const CASCADE_ATTEMPT: &str = "cascade.attempt";

// --- Operation name values ---

/// Router (triage) decision call.
pub const OP_ROUTE: &str = "route";

/// Heavy-stage answer call.
pub const OP_ANSWER: &str = "answer";

// --- Provider name values ---

/// OpenAI Responses API provider identifier.
pub const PROVIDER_OPENAI: &str = "openai";
