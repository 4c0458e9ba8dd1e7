// Handler tiers, mirrored by the router in `app.rs`:
// public (no auth) → protected (JWT auth; mutations also require an admin role)
pub mod protected;
pub mod public;
pub mod utils;
