/// Router Module Index
///
/// Organizes the application's routing logic into security-segregated modules,
/// enforcing a Defense-in-Depth strategy. The split is structural: whether an
/// endpoint is subject to authorization is decided by which module it lives in,
/// never by a conditional inside a shared code path.

/// Routes mounted outside the authorization stack (health probe, identity proxies).
/// No principal attachment, classification, or permission check ever runs for these.
pub mod public;

/// The matrix administration surface, wrapped by the principal, resolver, and
/// authorization layers. Requirements are declared in its `protection_bindings` table.
pub mod admin;
