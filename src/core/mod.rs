// ─── Launcher Core ───
// Identity & skin-cache reconciliation engine for a desktop launcher shell.
//
// Architecture:
//   core/
//     auth/     — Account model, device-code login, Microsoft token chain
//     accounts  — Multi-account store with the active pointer
//     skins/    — Cache resolver, sync coordinator, local library
//     storage   — Injected key-value persistence seam
//     events    — Change notifications for the shell
//     error     — Central error taxonomy
//     http      — Shared HTTP client

pub mod accounts;
pub mod auth;
pub mod error;
pub mod events;
pub mod http;
pub mod skins;
pub mod storage;
