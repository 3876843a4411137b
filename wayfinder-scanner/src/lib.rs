pub mod document;
pub mod error;
pub mod explorer;
pub mod frontier;
pub mod html;
pub mod identity;
pub mod journey;
pub mod ledger;
pub mod locator;
pub mod mapper;
pub mod resolver;

pub use document::{Document, ElementHandle, PageSnapshot, Probe, SessionGuard, SignInDetector};
pub use error::{BranchFailure, DocumentError, ScanError};
pub use explorer::{ExplorationState, Explorer, ExplorerSettings, RunSummary};
pub use html::{HttpOptions, HttpSource, MemorySource, StaticDocument};
pub use identity::{CanonicalId, NavigableResource, ResourceIdentity};
pub use journey::{Journey, JourneyRunner, SuccessSignal};
pub use ledger::{ActionKind, ActionLedger, LedgerEntry, LedgerSink};
pub use locator::{CandidateLocator, ElementQuery, Intent};
pub use mapper::{DiscoveredFeature, FeatureKind, SectionMapper};
pub use resolver::{ElementResolver, Resolution};
