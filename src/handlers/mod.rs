// handlers/mod.rs - two security tiers
//
// Public (no auth): service description and health
// Protected (/api/*): every route runs the Authenticate stage first, then
// its own validation, role gate and plan limit stages
pub mod protected;
pub mod public;
