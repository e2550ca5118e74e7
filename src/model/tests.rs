use geo::{line_string, point, MultiPoint, Point};
use time::macros::datetime;
use time::PrimitiveDateTime;

use super::*;
use crate::frame::Value;

fn triplegs_frame() -> Result<Frame> {
    Frame::new(vec![
        ("user_id", Column::from(vec![0, 0, 1])),
        (
            "started_at",
            Column::from(vec![
                datetime!(1971-01-01 0:00 UTC),
                datetime!(1971-01-01 5:00 UTC),
                datetime!(1971-01-02 7:00 UTC),
            ]),
        ),
        (
            "finished_at",
            Column::from(vec![
                datetime!(1971-01-01 0:20 UTC),
                datetime!(1971-01-01 5:10 UTC),
                datetime!(1971-01-02 8:00 UTC),
            ]),
        ),
        ("label", Column::from(vec!["a", "b", "c"])),
        (
            "geometry",
            Column::geometries(vec![
                line_string![(x: 8.5067847, y: 47.4), (x: 8.5067847, y: 47.5)],
                line_string![(x: 8.5067847, y: 47.5), (x: 8.5067847, y: 47.6)],
                line_string![(x: 8.5067847, y: 47.6), (x: 8.5067847, y: 47.7)],
            ]),
        ),
    ])?
    .with_geometry("geometry")
}

fn positionfixes_frame() -> Result<Frame> {
    Frame::new(vec![
        ("user_id", Column::from(vec![0, 0, 1])),
        (
            "tracked_at",
            Column::from(vec![
                datetime!(1971-01-01 0:00 UTC),
                datetime!(1971-01-01 5:00 UTC),
                datetime!(1971-01-02 7:00 UTC),
            ]),
        ),
        (
            "geometry",
            Column::geometries(vec![
                Point::new(8.5067847, 47.4),
                Point::new(8.5067847, 47.5),
                Point::new(8.5067847, 47.6),
            ]),
        ),
    ])?
    .with_geometry("geometry")
}

#[test]
fn construct_valid_triplegs() -> Result<()> {
    let tpls = Triplegs::new(triplegs_frame()?)?;

    assert_eq!(Kind::Triplegs, tpls.kind());
    assert!(tpls.check());
    assert_eq!(3, tpls.len());

    Ok(())
}

#[test]
fn construct_reports_violations() -> Result<()> {
    let frame = triplegs_frame()?.drop(&["finished_at"])?;
    assert!(matches!(
        Triplegs::new(frame),
        Err(Error::MissingColumns {
            entity: "triplegs",
            ..
        })
    ));

    let naive: Vec<PrimitiveDateTime> = vec![
        datetime!(1971-01-01 0:00),
        datetime!(1971-01-01 5:00),
        datetime!(1971-01-02 7:00),
    ];
    let frame = triplegs_frame()?.with_column("started_at", Column::from(naive))?;
    assert!(matches!(
        Triplegs::new(frame),
        Err(Error::NotTimezoneAware { .. })
    ));

    let frame = triplegs_frame()?.head(0);
    assert!(matches!(
        Triplegs::new(frame),
        Err(Error::Empty { entity: "triplegs" })
    ));

    Ok(())
}

#[test]
fn construct_with_wrong_geometry() -> Result<()> {
    let frame = positionfixes_frame()?;
    assert!(matches!(
        Staypoints::new(frame.clone()),
        Err(Error::MissingColumns { .. })
    ));
    assert!(Positionfixes::new(frame.clone()).is_ok());

    let points = Column::geometries(vec![
        Point::new(0., 0.),
        Point::new(0., 1.),
        Point::new(0., 2.),
    ]);
    let frame = triplegs_frame()?.with_column("geometry", points)?;
    assert!(matches!(
        Triplegs::new(frame.clone()),
        Err(Error::GeometryType { .. })
    ));
    assert!(Triplegs::with_options(frame, false).is_ok());

    Ok(())
}

#[test]
fn identity_selection_keeps_view() -> Result<()> {
    let tpls = Triplegs::new(triplegs_frame()?)?;

    let all = tpls.filter(&[true, true, true])?;
    assert_eq!(Tag::View(Kind::Triplegs), all.tag());

    let names = tpls.frame().column_names();
    let all = tpls.select(&names)?;
    assert_eq!(Some(Kind::Triplegs), all.kind());

    Ok(())
}

#[test]
fn copy_keeps_view() -> Result<()> {
    let tpls = Triplegs::new(triplegs_frame()?)?;

    let copy = tpls.copy();
    assert_eq!(Some(Kind::Triplegs), copy.kind());
    assert_eq!(tpls.frame(), copy.frame());

    Ok(())
}

#[test]
fn merge_keeps_view() -> Result<()> {
    let pfs = Positionfixes::new(positionfixes_frame()?)?;

    let merged = pfs.merge(pfs.frame(), &["user_id"], ("", "_other"))?;
    assert_eq!(Some(Kind::Positionfixes), merged.kind());
    assert!(merged.frame().contains("tracked_at_other"));

    Ok(())
}

#[test]
fn drop_user_id_is_generic() -> Result<()> {
    let tpls = Triplegs::new(triplegs_frame()?)?;

    let dropped = tpls.drop(&["user_id"])?;
    assert!(dropped.is_generic());
    // still a geometry table, just not a typed one
    assert_eq!(Some("geometry"), dropped.frame().geometry_name());

    Ok(())
}

#[test]
fn drop_geometry_falls_back() -> Result<()> {
    let tpls = Triplegs::new(triplegs_frame()?)?;

    let dropped = tpls.drop(&["geometry"])?;
    assert_eq!(Some(Kind::TriplegsTable), dropped.kind());

    let table: TriplegsTable = dropped.expect_view()?;
    assert_eq!(None, table.frame().geometry_name());

    Ok(())
}

#[test]
fn drop_unrelated_keeps_view() -> Result<()> {
    let tpls = Triplegs::new(triplegs_frame()?)?;

    let dropped = tpls.drop(&["label"])?;
    assert_eq!(Some(Kind::Triplegs), dropped.kind());

    Ok(())
}

#[test]
fn no_fallback_is_generic() -> Result<()> {
    let pfs = Positionfixes::new(positionfixes_frame()?)?;

    let dropped = pfs.drop(&["geometry"])?;
    assert!(dropped.is_generic());

    let dropped = pfs.drop(&["tracked_at"])?;
    assert!(dropped.is_generic());

    Ok(())
}

#[test]
fn degradation_is_one_directional() -> Result<()> {
    let tpls = Triplegs::new(triplegs_frame()?)?;
    let geometry = tpls.column("geometry");

    let table: TriplegsTable = tpls.drop(&["geometry"])?.expect_view()?;
    let restored = match geometry {
        Some(geometry) => table.derive(|f| f.with_column("geometry", geometry)?.with_geometry("geometry"))?,
        None => return Err(Error::ColumnNotFound("geometry".to_string())),
    };

    // the geometry is back but the table is still derived from a table view
    assert_eq!(Some(Kind::TriplegsTable), restored.kind());

    Ok(())
}

#[test]
fn empty_selection_degrades() -> Result<()> {
    let tpls = Triplegs::new(triplegs_frame()?)?;

    let none = tpls.filter(&[false, false, false])?;
    assert!(none.is_generic());
    assert!(matches!(
        none.expect_view::<entity::Tripleg>(),
        Err(Error::Degraded {
            expected: "triplegs",
            found: "a generic table"
        })
    ));

    Ok(())
}

#[test]
fn lower_dimensional_results_are_untouched() -> Result<()> {
    let tpls = Triplegs::new(triplegs_frame()?)?;

    let row = tpls.derive(|f| Ok(f.row(0)))?;
    assert_eq!(Some(Value::Int(0)), row.and_then(|r| r.get("user_id").cloned()));

    let column = tpls.derive(|f| f.column_or_err("label"))?;
    assert_eq!(Column::from(vec!["a", "b", "c"]), column);

    let len = tpls.derive(|f| Ok(f.len()))?;
    assert_eq!(3, len);

    Ok(())
}

#[test]
fn concat_keeps_view() -> Result<()> {
    let tpls = Triplegs::new(triplegs_frame()?)?;

    let twice = tpls.concat(&[tpls.frame()])?;
    assert_eq!(Some(Kind::Triplegs), twice.kind());
    assert_eq!(6, twice.frame().len());

    Ok(())
}

#[test]
fn trips_fall_back_to_table() -> Result<()> {
    let frame = Frame::new(vec![
        ("user_id", Column::from(vec![0])),
        ("started_at", Column::from(vec![datetime!(1971-01-01 0:00 UTC)])),
        ("finished_at", Column::from(vec![datetime!(1971-01-01 5:00 UTC)])),
        ("origin_staypoint_id", Column::from(vec![1])),
        ("destination_staypoint_id", Column::from(vec![2])),
        (
            "geom",
            Column::geometries(vec![MultiPoint::new(vec![
                point!(x: 8.5067847, y: 47.4),
                point!(x: 8.5067847, y: 47.40001),
            ])]),
        ),
    ])?
    .with_geometry("geom")?;

    let trips = Trips::new(frame)?;
    assert_eq!(Some(Kind::TripsTable), trips.drop(&["geom"])?.kind());
    assert!(trips.drop(&["origin_staypoint_id"])?.is_generic());

    Ok(())
}

#[test]
fn tagged_into_view() -> Result<()> {
    let tagged: Tagged = Triplegs::new(triplegs_frame()?)?.into();

    assert!(tagged.clone().into_view::<entity::Staypoint>().is_none());
    let tpls: Triplegs = tagged.try_into()?;
    assert!(tpls.validate_geometry());

    Ok(())
}
