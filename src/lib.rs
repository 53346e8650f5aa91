/*!
 * # subflow - asynchronous subtitle translation jobs
 *
 * A Rust library that translates media subtitles on demand for a streaming
 * client. A request for a title and language becomes a persisted job; the
 * job's source subtitle is split into batches that are translated in
 * parallel and reassembled in original cue order.
 *
 * ## Features
 *
 * - At most one job per content key, safe under concurrent requests
 * - Batched, rate-limited translation through pluggable backends:
 *   - OpenAI and OpenAI-compatible APIs (Gemini, OpenRouter, Groq, Together AI)
 *   - DeepL text and document APIs
 * - Count-mismatch recovery for backends that lose or merge lines
 * - Ordered reassembly independent of batch completion order
 * - One-shot failure cascade: no partial translation is ever finalized
 * - Placeholder documents while a job is running or after it failed
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `app_controller`: Service facade wiring every component
 * - `artifacts`: Artifact store and placeholder documents
 * - `content`: Content keys, requester scopes and stream id resolution
 * - `database`: SQLite job and batch store
 * - `errors`: Error types for the application
 * - `language_utils`: ISO language code utilities
 * - `pipeline`: The job pipeline:
 *   - `pipeline::intake`: Dedup gate
 *   - `pipeline::orchestrator`: Source fetch, parse and batch creation
 *   - `pipeline::batch_worker`: Per-batch translation
 *   - `pipeline::recovery`: Retry and count-mismatch recovery
 *   - `pipeline::assembly`: Ordered artifact assembly
 *   - `pipeline::status`: Job status transitions and the failure cascade
 *   - `pipeline::rate_limit`: Per-provider rate limiter registry
 * - `providers`: Translation backends
 * - `queue`: In-process work queue with retries
 * - `sources`: Source subtitle lookup
 * - `subtitle_processor`: SRT parsing and rendering
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::too_many_arguments)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod artifacts;
pub mod content;
pub mod database;
pub mod errors;
pub mod language_utils;
pub mod pipeline;
pub mod providers;
pub mod queue;
pub mod sources;
pub mod subtitle_processor;

// Re-export main types for easier usage
pub use app_config::Config;
pub use app_controller::{AppController, Components, RequestOutcome};
pub use content::{ContentKey, RequesterScope};
pub use errors::{AppError, PipelineError, ProviderError};
pub use subtitle_processor::{parse_srt, render_srt, Cue};
