//! Systems, in the order a host registers them:
//! input, facing direction, physics, collision, wall bounds, network update.

mod collision;
mod facing_direction;
mod input;
mod network_update;
mod physics;
mod session_input;
mod wall_bounds;

pub use collision::{push_out_of_floor, Collision};
pub use facing_direction::FacingDirection;
pub use input::{apply_input, Action, Input, InputHandle, InputState};
pub use network_update::{ClientNetworkUpdate, ServerNetworkUpdate};
pub use physics::Physics;
pub use session_input::SessionInput;
pub use wall_bounds::WallBounds;
