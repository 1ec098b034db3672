pub mod decode;
pub mod dispatch;
pub mod fallback;
pub mod hash;
pub mod identify;
pub mod load;
pub mod normalize;
pub mod ocr;
pub mod session;
pub mod strategies;

#[cfg(test)]
pub(crate) mod test_support;
