/// Common test utilities and mock infrastructure
///
/// This module provides shared functionality for integration tests including:
/// - A mock backend validator with failure injection
/// - Store seeding and digit-entry helpers
pub mod helpers;
pub mod mock_backend;
