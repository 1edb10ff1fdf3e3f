//! Message payloads exchanged with runners.
//!
//! - **Runner-bound** (`runner_bound`): orders and requests sent by the server
//! - **Server-bound** (`server_bound`): acknowledgements, results and status from runners

/// Implement [`Entity`](crate::Entity) with the type name as identifier.
macro_rules! entities {
    ($($ty:ident),* $(,)?) => {
        $(
            impl $crate::envelope::Entity for $ty {
                const IDENTIFIER: &'static str = stringify!($ty);
            }
        )*
    };
}

pub(crate) use entities;

pub mod runner_bound;
pub mod server_bound;

pub use runner_bound::*;
pub use server_bound::*;
