//! Multi-session SSH orchestration: session lifecycle, sub-channels, an
//! encrypted credential vault and remote host metrics, exposed as MCP tools.

pub mod hub;
