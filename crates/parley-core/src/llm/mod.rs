mod traits;
mod claude;

pub use traits::*;
pub use claude::ClaudeTransport;
