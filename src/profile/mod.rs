//! User profiles: data model, onboarding steps, caching and lookup.

pub mod cache;
pub mod model;
pub mod resolver;
pub mod state;

pub use cache::ProfileCache;
pub use model::{
    ActivationPolicy, CollectionAccount, IssuedCard, ProfileInvariant, UserProfile,
    WaitlistEntry, normalize_handle,
};
pub use resolver::{ProfileLookup, ProfileResolver};
pub use state::{CompletionKind, OnboardingStep};
