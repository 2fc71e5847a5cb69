#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Live incident feed for the dispatch map.
//!
//! The feed is a set of active cases kept in sync with the record store:
//! a filtered snapshot seeds it, then realtime create/update/delete events
//! are folded in one at a time by [`reducer::FeedSet::apply`]. A
//! [`session::LiveFeed`] owns the subscription and reconnect loop and
//! publishes every new state over a `tokio::sync::watch` channel;
//! [`map::MapView`] turns a published set into markers.

pub mod alerts;
pub mod map;
pub mod reducer;
pub mod session;

pub use alerts::{AlertDispatcher, BellBackend, Cue, CueBackend, CueHandle, LogBackend};
pub use map::MapView;
pub use reducer::{FeedEvent, FeedSet, Transition, apply_event};
pub use session::{FeedError, FeedState, FeedStatus, LiveFeed, ReconnectPolicy};
