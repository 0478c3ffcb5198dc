//! # LLM Module
//!
//! Provides abstractions and clients for interacting with Large Language Models (LLMs).
//! It defines a common `LLMClient` trait and an implementation for
//! OpenAI-compatible chat-completion backends.

pub mod base_client;
pub mod openai_client;

pub use base_client::{LLMClient, LLMError};
pub use openai_client::OpenAIClient;
