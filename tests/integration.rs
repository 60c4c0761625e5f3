//! Integration tests: full scans through the real gateway, engine and
//! PnL calculator against in-memory vendors.

mod integration {
    pub mod mock_exchange;
    mod scan_flow;
}
