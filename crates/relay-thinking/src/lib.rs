pub mod cache;
pub mod group;
pub mod prefixed;
pub mod rewriter;

pub use cache::{cache_key, is_valid_signature, MemorySignatureCache, NoopCache, SignatureCache};
pub use group::model_group;
pub use prefixed::{format_prefixed, parse_prefixed};
pub use rewriter::{
    fast_detect, has_thinking_signature, rewrite_request, rewrite_response, RewriteStats,
    SseSignatureProcessor,
};
