/// Router Module Index
///
/// Splits the dispatch table by access level. Access control is applied to a whole
/// module with an Axum layer, so a protected endpoint cannot be exposed by forgetting
/// a check inside one handler.

/// Routes accessible to any visitor (reads, login, comment submission).
pub mod public;

/// Routes behind the bearer-token guard (create/delete, token verification).
pub mod authenticated;
