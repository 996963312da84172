//! End-to-end driver tests: purchases, training and combat seen through
//! the replicas.

use bastion_core::components::ConnectionId;
use bastion_headless::protocol::{EntityKindName, EntityState, StateReport};
use bastion_headless::{Command, Driver, RequestSpec, Response};
use bastion_test_utils::fixtures::{BARRACKS, WALL};

fn find(report: &StateReport, kind: EntityKindName, owner: u32) -> Vec<&EntityState> {
    report
        .entities
        .iter()
        .filter(|e| e.kind == kind && e.owner == Some(owner))
        .collect()
}

fn request(driver: &mut Driver, connection: u32, request: RequestSpec) -> Response {
    driver
        .execute(Command::Request {
            connection,
            request,
        })
        .remove(0)
}

fn duel() -> Driver {
    let mut driver = Driver::standard().unwrap();
    driver.execute(Command::Connect { connection: None });
    driver.execute(Command::Connect { connection: None });
    driver
}

fn place(driver: &mut Driver, connection: u32, buyable: u32, dx: f64) -> Response {
    let server = driver.report(None).unwrap();
    let base = find(&server, EntityKindName::Base, connection)[0].clone();
    request(
        driver,
        connection,
        RequestSpec::PlaceBuilding {
            buyable,
            base: base.id,
            x: base.x + dx,
            y: base.y,
            heading: 0.0,
        },
    )
}

#[test]
fn test_trained_unit_appears_on_every_replica() {
    let mut driver = duel();
    assert!(matches!(
        place(&mut driver, 1, BARRACKS.0, 5.0),
        Response::Outcome { accepted: true, .. }
    ));

    let server = driver.report(None).unwrap();
    let barracks = find(&server, EntityKindName::Building, 1)[0].id;
    assert!(matches!(
        request(&mut driver, 1, RequestSpec::TrainUnit { spawner: barracks }),
        Response::Outcome { accepted: true, .. }
    ));
    driver.execute(Command::Tick { count: 200 });

    let own = driver.report(Some(ConnectionId(1))).unwrap();
    let other = driver.report(Some(ConnectionId(2))).unwrap();
    let units = find(&own, EntityKindName::Unit, 1);
    assert_eq!(units.len(), 1);
    assert!(units[0].authority);
    assert_eq!(find(&other, EntityKindName::Unit, 1).len(), 1);
    assert!(!find(&other, EntityKindName::Unit, 1)[0].authority);
    assert!(driver.session().divergences().is_empty());
}

#[test]
fn test_gold_reported_by_replica() {
    let mut driver = duel();
    place(&mut driver, 2, WALL.0, 4.0);

    let report = driver
        .report(Some(ConnectionId(2)))
        .unwrap();
    assert_eq!(report.gold, Some(450));
}

#[test]
fn test_foreign_base_refused() {
    let mut driver = duel();
    let server = driver.report(None).unwrap();
    let foreign = find(&server, EntityKindName::Base, 2)[0].clone();

    let response = request(
        &mut driver,
        1,
        RequestSpec::PlaceBuilding {
            buyable: WALL.0,
            base: foreign.id,
            x: foreign.x + 2.0,
            y: foreign.y,
            heading: 0.0,
        },
    );

    assert!(matches!(response, Response::Outcome { accepted: false, .. }));
}
