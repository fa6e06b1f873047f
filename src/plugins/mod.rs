pub mod cms;
pub mod dns;
pub mod nmap;
pub mod probe;
pub mod registry;
pub mod types;
pub mod web;
