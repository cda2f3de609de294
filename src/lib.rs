// [rust] Library root - the binary and the HTTP tests both build on these modules
pub mod config; // Configuration management and environment variable handling
pub mod db; // Principal store, task ownership lookups, PostgreSQL and in-memory backends
pub mod oauth; // Delegated login through external identity providers
pub mod security; // Session tokens, login-state cookie, redirect allow-list, access decisions
pub mod web; // HTTP routing, extractors, handlers and failure rendering
