pub mod metainfo;
