use std::sync::Arc;

use gridmatch_matchcore::MatchingEngine;
use gridmatch_settlement::SortingCoordinator;

use crate::hub::BroadcastHub;

/// Shared handles behind every route.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<MatchingEngine>,
    pub coordinator: Arc<SortingCoordinator>,
    pub hub: Arc<BroadcastHub>,
}

impl AppState {
    pub fn new(
        engine: Arc<MatchingEngine>,
        coordinator: Arc<SortingCoordinator>,
        hub: Arc<BroadcastHub>,
    ) -> Self {
        Self {
            engine,
            coordinator,
            hub,
        }
    }
}
