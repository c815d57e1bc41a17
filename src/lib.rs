#![deny(unsafe_code)]

macro_rules! export {
    [$( $module:ident ),* $(,)*] => {
        $(
            mod $module;
            pub use self::$module::*;
        )*
    };
}

mod device;
mod engine;
mod scene;
mod store;
mod web;

pub use device::*;
pub use engine::*;
pub use scene::*;
pub use store::*;
pub use web::*;
