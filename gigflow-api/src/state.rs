use gigflow_order::OrderEngine;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<OrderEngine>,
}
