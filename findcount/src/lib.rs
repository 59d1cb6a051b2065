pub mod cancel;
pub mod config;
pub mod count;
pub mod errors;
pub mod metrics;
pub mod results;
pub mod signals;
pub mod source;

pub use cancel::{CancelReason, CancelSignal};
pub use config::{ConfigOverrides, CountConfig, EncodingMode, ErrorPolicy};
pub use count::{SubstringCounter, SubstringMatcher};
pub use errors::{CountError, CountResult};
pub use results::{CountReport, Outcome, TargetCount};
pub use source::{FileSource, HttpSource, SourceGateway, SourceKind, SourceStream};
