/// Router Module Index
///
/// Routes are grouped by the guard that protects them. `create_router` layers each
/// group with its guard before merging, so a handler can never be reached without
/// the check its group requires.

/// Routes open to anonymous clients: health, registration, login and activation.
pub mod public;

/// Routes requiring a valid session cookie.
pub mod authenticated;

/// Routes requiring a valid session whose role is admin.
pub mod admin;
