//! Test fixtures: a scripted transport and a small Trippin schema

use crate::api::ODataApi;
use crate::schema::{CallableDef, EnumTypeDef, FieldDef, SchemaRegistry, StructuredType};
use crate::settings::ODataSettings;
use crate::transport::{Headers, Transport, TransportRequest, TransportResponse};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub const SERVICE_ROOT: &str = "https://services.example.com/trippin/";

#[derive(Default)]
struct MockState {
    responses: VecDeque<TransportResponse>,
    requests: Vec<TransportRequest>,
}

/// Records requests and answers with queued responses, `204` once empty
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, status: u16, headers: &[(&str, &str)], body: &str) {
        let headers: Headers = headers.iter().copied().collect();
        self.state
            .lock()
            .unwrap()
            .responses
            .push_back(TransportResponse::new(status, headers, body.as_bytes().to_vec()));
    }

    pub fn respond_json(&self, status: u16, body: Value) {
        self.respond(
            status,
            &[
                ("Content-Type", "application/json;odata.metadata=minimal"),
                ("OData-Version", "4.0"),
            ],
            &body.to_string(),
        );
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.state.lock().unwrap().requests.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: TransportRequest) -> anyhow::Result<TransportResponse> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(request);
        Ok(state
            .responses
            .pop_front()
            .unwrap_or_else(|| TransportResponse::new(204, Headers::new(), Vec::new())))
    }
}

pub fn settings() -> ODataSettings {
    ODataSettings::minimal(SERVICE_ROOT)
}

pub fn api_with(transport: MockTransport) -> ODataApi {
    api_with_settings(transport, settings())
}

pub fn api_with_settings(transport: MockTransport, settings: ODataSettings) -> ODataApi {
    let _ = env_logger::builder().is_test(true).try_init();
    ODataApi::builder(settings)
        .schema(trippin_schema())
        .transport(Arc::new(transport))
        .build()
}

pub fn trippin_schema() -> SchemaRegistry {
    SchemaRegistry::builder()
        .enum_type(
            EnumTypeDef::new("Trippin", "PersonGender")
                .member("Male", 0)
                .member("Female", 1)
                .member("Unknown", 2),
        )
        .structured_type(
            StructuredType::complex("Trippin", "City")
                .field(FieldDef::new("Name", "Edm.String").required())
                .field(FieldDef::new("CountryRegion", "Edm.String"))
                .field(FieldDef::new("Region", "Edm.String")),
        )
        .structured_type(
            StructuredType::complex("Trippin", "Location")
                .field(FieldDef::new("Address", "Edm.String").required())
                .field(FieldDef::new("City", "Trippin.City")),
        )
        .structured_type(
            StructuredType::complex("Trippin", "AirportLocation")
                .base_type("Trippin.Location")
                .field(FieldDef::new("Loc", "Edm.GeographyPoint")),
        )
        .structured_type(
            StructuredType::entity("Trippin", "Person")
                .key("UserName")
                .field(
                    FieldDef::new("UserName", "Edm.String")
                        .required()
                        .max_length(20),
                )
                .field(FieldDef::new("FirstName", "Edm.String").required())
                .field(FieldDef::new("LastName", "Edm.String").max_length(26))
                .field(FieldDef::new("Age", "Edm.Int64"))
                .field(FieldDef::new("Emails", "Collection(Edm.String)"))
                .field(FieldDef::new("Gender", "Trippin.PersonGender"))
                .field(FieldDef::new("AddressInfo", "Collection(Trippin.Location)"))
                .field(FieldDef::new("HomeAddress", "Trippin.Location"))
                .field(FieldDef::new("Friends", "Collection(Trippin.Person)").navigation())
                .field(FieldDef::new("BestFriend", "Trippin.Person").navigation())
                .field(FieldDef::new("Trips", "Collection(Trippin.Trip)").navigation()),
        )
        .structured_type(
            StructuredType::entity("Trippin", "Employee")
                .base_type("Trippin.Person")
                .field(FieldDef::new("Cost", "Edm.Int64")),
        )
        .structured_type(
            StructuredType::entity("Trippin", "Trip")
                .key("TripId")
                .field(FieldDef::new("TripId", "Edm.Int32").required())
                .field(FieldDef::new("Name", "Edm.String"))
                .field(FieldDef::new("Budget", "Edm.Single"))
                .field(FieldDef::new("StartsAt", "Edm.DateTimeOffset")),
        )
        .structured_type(
            StructuredType::entity("Trippin", "Airline")
                .key("AirlineCode")
                .field(FieldDef::new("AirlineCode", "Edm.String").required())
                .field(FieldDef::new("Name", "Edm.String")),
        )
        .structured_type(
            StructuredType::entity("Trippin", "Airport")
                .key("IcaoCode")
                .field(FieldDef::new("IcaoCode", "Edm.String").required())
                .field(FieldDef::new("Name", "Edm.String"))
                .field(FieldDef::new("Location", "Trippin.AirportLocation")),
        )
        .entity_set("People", "Trippin.Person")
        .entity_set("Airlines", "Trippin.Airline")
        .entity_set("Airports", "Trippin.Airport")
        .entity_set("Trips", "Trippin.Trip")
        .singleton("Me", "Trippin.Person")
        .callable(
            CallableDef::function("Trippin", "GetFavoriteAirline")
                .bound_to("Trippin.Person")
                .returns("Trippin.Airline"),
        )
        .callable(
            CallableDef::function("Trippin", "GetFriendsTrips")
                .bound_to("Trippin.Person")
                .parameter("userName", "Edm.String")
                .returns("Collection(Trippin.Trip)"),
        )
        .callable(
            CallableDef::function("Trippin", "GetInvolvedPeople")
                .bound_to("Trippin.Trip")
                .returns("Collection(Trippin.Person)"),
        )
        .callable(
            CallableDef::function("Trippin", "GetNearestAirport")
                .parameter("lat", "Edm.Double")
                .parameter("lon", "Edm.Double")
                .returns("Trippin.Airport"),
        )
        .callable(
            CallableDef::function("Trippin", "GetOldestPerson")
                .bound_to("Collection(Trippin.Person)")
                .returns("Trippin.Person"),
        )
        .callable(
            CallableDef::function("Trippin", "GetCost")
                .bound_to("Trippin.Employee")
                .returns("Edm.Int64"),
        )
        .callable(CallableDef::action("Trippin", "ResetDataSource"))
        .callable(
            CallableDef::action("Trippin", "ShareTrip")
                .bound_to("Trippin.Person")
                .parameter("userName", "Edm.String")
                .parameter("tripId", "Edm.Int32"),
        )
        .callable(
            CallableDef::action("Trippin", "UpdateLastName")
                .bound_to("Trippin.Person")
                .parameter("lastName", "Edm.String")
                .returns("Edm.Boolean"),
        )
        .build()
}
