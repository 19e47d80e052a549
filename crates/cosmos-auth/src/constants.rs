//! Cosmos DB and Azure platform constants
//!
//! Public, well-known values. The emulator key is published in the emulator
//! documentation and only works against a local emulator.

/// Well-known account key of the local Cosmos DB emulator.
pub const EMULATOR_KEY: &str =
    "C2y6yDjf5/R+ob0N8A7Cgv30VRDJIWEHLM+4QDU5DE2nQ9nDuVTqobD4b8mGGyPMbIZnqyMsEcaGQy67XIw/Jw==";

/// Host suffix of production Cosmos DB accounts.
pub const PRODUCTION_HOST_SUFFIX: &str = ".documents.azure.com";

/// Host suffixes of internal test/staging deployments, rewritten to
/// production when requesting tokens.
pub const TEST_HOST_SUFFIXES: &[&str] = &[
    ".documents-test.windows-int.net",
    ".documents-staging.windows-ppe.net",
];

/// Azure Resource Manager endpoint for management-plane key listing.
pub const ARM_ENDPOINT: &str = "https://management.azure.com";

/// Token scope for Azure Resource Manager.
pub const ARM_SCOPE: &str = "https://management.azure.com/.default";

/// `Microsoft.DocumentDB` resource provider API version.
pub const ARM_API_VERSION: &str = "2024-05-15";

/// Instance metadata service token endpoint (managed identity).
pub const IMDS_TOKEN_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

/// IMDS API version.
pub const IMDS_API_VERSION: &str = "2018-02-01";

/// Service message returned when an account rejects key authentication.
pub const LOCAL_AUTH_DISABLED_MESSAGE: &str = "Local Authorization is disabled";

/// Lifetime assumed for tokens whose expiry the provider did not report.
pub const DEFAULT_TOKEN_LIFETIME_MILLIS: u64 = 60 * 60 * 1000;

/// Cached tokens are refreshed once they are this close to expiry.
pub const TOKEN_REFRESH_MARGIN_MILLIS: u64 = 5 * 60 * 1000;
