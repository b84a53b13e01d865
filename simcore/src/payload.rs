//! Event payload marker trait.
//!
//! Every topic carries a single concrete struct type as its payload (following
//! `cloud-plugin`'s one-struct-per-event convention). The bus stores payloads as
//! `Box<dyn Payload>` and needs to hand an independent copy to each subscriber, so payloads must
//! be both downcastable (to let a typed `subscribe::<P, _>` closure recover `P`) and cloneable
//! (`dyn_clone`, since `Clone` itself is not object-safe).

use downcast_rs::{impl_downcast, Downcast};
use dyn_clone::DynClone;
use std::fmt::Debug;

pub trait Payload: Downcast + DynClone + Debug {}

impl_downcast!(Payload);
dyn_clone::clone_trait_object!(Payload);

impl<T: Clone + Debug + 'static> Payload for T {}
