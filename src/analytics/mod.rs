pub mod carry_over;
pub mod detail;
pub mod export;
pub mod payout;
pub mod rank;
pub mod tax;

pub use carry_over::{resolve, CarryOverResolver, Resolution, ResolutionWarning, ResolverState};
pub use detail::{assemble, assemble_period, DetailRow, DetailTable, SalesPresence, TalentPeriods};
pub use payout::{CalcError, Payout};
pub use rank::{agency_tier, individual_rank, rank_for_amount, AgencyTier, IndividualRank, RankOutcome};
pub use tax::{normalize_tax_flag, TaxMarker};
