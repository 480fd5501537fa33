//! Location-establishing handlers.

use tracing::{debug, info};

use super::super::codes::key;
use super::super::{FromParameters, Handler, HandlerContext, HandlerOutcome, ParamReader};
use crate::domain::market::LocationId;
use crate::domain::session::SessionPhase;

fn establish(handler: &'static str, raw: &str, ctx: &HandlerContext<'_>) -> HandlerOutcome {
    let Some(location) = LocationId::new(raw) else {
        ctx.session.invalidate();
        debug!(handler, "Location missing from establishing message");
        return HandlerOutcome::LocationUnconfirmed;
    };

    let previous = ctx.session.establish(location.clone());
    if previous != SessionPhase::Known(location.clone()) {
        info!(handler, location = %location, "Location established");
    }
    HandlerOutcome::LocationEstablished(location)
}

/// Join response; carries the player's location.
#[derive(Debug, Clone, Default)]
pub struct JoinResponse {
    location: String,
}

impl FromParameters for JoinResponse {
    fn from_parameters(params: &ParamReader<'_>) -> Self {
        Self {
            location: params.string(key::JOIN_LOCATION),
        }
    }
}

impl Handler for JoinResponse {
    fn name(&self) -> &'static str {
        "join_response"
    }

    fn process(&self, ctx: &HandlerContext<'_>) -> HandlerOutcome {
        establish(self.name(), &self.location, ctx)
    }
}

/// Server confirmation of a completed cluster change.
#[derive(Debug, Clone, Default)]
pub struct ClusterChangedEvent {
    location: String,
}

impl FromParameters for ClusterChangedEvent {
    fn from_parameters(params: &ParamReader<'_>) -> Self {
        Self {
            location: params.string(key::CLUSTER_LOCATION),
        }
    }
}

impl Handler for ClusterChangedEvent {
    fn name(&self) -> &'static str {
        "cluster_changed_event"
    }

    fn process(&self, ctx: &HandlerContext<'_>) -> HandlerOutcome {
        establish(self.name(), &self.location, ctx)
    }
}

/// Client request to change cluster. The new location is unconfirmed until
/// the server answers, so the session becomes `Unknown`.
#[derive(Debug, Clone, Default)]
pub struct ChangeClusterRequest;

impl FromParameters for ChangeClusterRequest {
    fn from_parameters(_params: &ParamReader<'_>) -> Self {
        Self
    }
}

impl Handler for ChangeClusterRequest {
    fn name(&self) -> &'static str {
        "change_cluster_request"
    }

    fn process(&self, ctx: &HandlerContext<'_>) -> HandlerOutcome {
        if let SessionPhase::Known(previous) = ctx.session.invalidate() {
            debug!(location = %previous, "Cluster change requested, location invalidated");
        }
        HandlerOutcome::LocationInvalidated
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use test_case::test_case;

    use super::*;
    use crate::application::services::{MarketNormalizer, UploadFanout};
    use crate::domain::protocol::{Parameters, Value};
    use crate::domain::session::SessionState;
    use crate::infrastructure::executor::DeferredExecutor;

    fn normalizer() -> MarketNormalizer {
        let fanout = Arc::new(UploadFanout::new(
            Vec::new(),
            "marketorders.ingest",
            Duration::from_secs(1),
        ));
        MarketNormalizer::new(fanout, None, Arc::new(DeferredExecutor::new()))
    }

    fn known_session(location: &str) -> SessionState {
        let session = SessionState::new();
        session.establish(LocationId::new(location).unwrap());
        session
    }

    fn run<H: Handler + FromParameters>(params: &Parameters, session: &SessionState) -> HandlerOutcome {
        let normalizer = normalizer();
        let ctx = HandlerContext {
            session,
            normalizer: &normalizer,
        };
        H::from_parameters(&ParamReader::new(params)).process(&ctx)
    }

    fn location_params(key: u8, value: Option<Value>) -> Parameters {
        let mut params = Parameters::new();
        if let Some(value) = value {
            params.insert(key, value);
        }
        params
    }

    #[test]
    fn join_with_location_establishes_it() {
        let session = SessionState::new();
        let params = location_params(key::JOIN_LOCATION, Some(Value::String("3005".into())));

        let outcome = run::<JoinResponse>(&params, &session);
        assert_eq!(
            outcome,
            HandlerOutcome::LocationEstablished(LocationId::new("3005").unwrap())
        );
        assert_eq!(session.location().unwrap().as_str(), "3005");
    }

    #[test_case(None ; "absent")]
    #[test_case(Some(Value::String(String::new())) ; "empty")]
    #[test_case(Some(Value::String("   ".into())) ; "blank")]
    #[test_case(Some(Value::Int(3005)) ; "mistyped")]
    fn join_without_usable_location_forgets_known_one(value: Option<Value>) {
        let session = known_session("0007");
        let params = location_params(key::JOIN_LOCATION, value);

        let outcome = run::<JoinResponse>(&params, &session);
        assert_eq!(outcome, HandlerOutcome::LocationUnconfirmed);
        assert!(!session.is_valid_location());
    }

    #[test]
    fn cluster_change_then_empty_confirmation_stays_unknown() {
        let session = known_session("3005");

        let outcome = run::<ChangeClusterRequest>(&Parameters::new(), &session);
        assert_eq!(outcome, HandlerOutcome::LocationInvalidated);
        assert!(!session.is_valid_location());

        let empty = location_params(key::CLUSTER_LOCATION, Some(Value::String(String::new())));
        let outcome = run::<ClusterChangedEvent>(&empty, &session);
        assert_eq!(outcome, HandlerOutcome::LocationUnconfirmed);
        assert!(!session.is_valid_location());

        let confirmed = location_params(key::CLUSTER_LOCATION, Some(Value::String("0007".into())));
        let outcome = run::<ClusterChangedEvent>(&confirmed, &session);
        assert_eq!(
            outcome,
            HandlerOutcome::LocationEstablished(LocationId::new("0007").unwrap())
        );
    }

    #[test]
    fn change_cluster_on_unknown_session_is_harmless() {
        let session = SessionState::new();
        let outcome = run::<ChangeClusterRequest>(&Parameters::new(), &session);
        assert_eq!(outcome, HandlerOutcome::LocationInvalidated);
        assert!(!session.is_valid_location());
    }
}
