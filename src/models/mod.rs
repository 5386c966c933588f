pub mod config;
pub mod ocr_result;
pub mod product;
pub mod roi;
pub mod scan;
