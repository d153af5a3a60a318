//! # Room Test Utilities
//!
//! Shared test utilities for the room service.
//!
//! This crate provides:
//! - Server test harness (`TestRoomServer` for end-to-end tests)
//! - Cookie helpers that stand in for a browser's cookie jar
//!
//! ## Usage
//!
//! ```rust,ignore
//! use room_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let server = TestRoomServer::spawn().await?;
//!     let room_id = server.create_room().await?;
//!
//!     let response = server.enter(&room_id, None).await?;
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod server_harness;

pub use server_harness::*;
