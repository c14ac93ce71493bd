//! Per-request admission pipeline for API services: rate limiting, API key extraction, scope
//! authorization, and credit metering composed into one ordered, short-circuiting decision.
//!
//! Build an [`AuthMeter`](pipeline::AuthMeter) once with
//! [`AuthMeter::builder`](pipeline::AuthMeter::builder), share it behind an `Arc`, and call
//! [`admit`](pipeline::AuthMeter::admit) or [`handle`](pipeline::AuthMeter::handle) for every
//! inbound request.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod capability;
pub mod clock;
pub mod credit;
pub mod error;
pub mod identity;
pub mod limiter;
pub mod obs;
pub mod pipeline;
pub mod request;
pub mod scope;
pub mod store;

pub use pipeline::{Admission, AuthMeter, AuthMeterBuilder};

mod _prelude {
	pub use std::{
		collections::{BTreeMap, BTreeSet, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{BoxError, Error, Result};
}

pub use time;
pub use url;
#[cfg(test)] use color_eyre as _;
