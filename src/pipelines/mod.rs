pub mod common;
pub mod cufflinks;
pub mod deseq;
pub mod rnaseq;
