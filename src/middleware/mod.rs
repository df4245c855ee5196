/// Middleware module
///
/// The perimeter guard (route match + access decision) and the CORS policy.

mod cors;
mod perimeter_guard;

pub use cors::{Cors, ALLOWED_HEADERS, ALLOWED_METHODS};
pub use perimeter_guard::PerimeterGuard;
