mod category;
mod profile;
mod recommendation;
mod term;

pub use category::Category;
pub use profile::{
    AgeGroup, DemographicWeights, Demographics, ExtractedProfile, Gender, Profile,
    RawDemographics,
};
pub use recommendation::{
    Batch, CategoryCount, MatchResult, ProductMatch, RankedList, RecommendationRecord, SeedMatch,
    Summary,
};
pub use term::{EntityMatch, InterestTerm, ResolvedEntity};
