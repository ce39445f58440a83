//! Bulk DELETE / UPDATE execution.

mod common;

use asupersync::runtime::RuntimeBuilder;
use common::{MockConnection, unwrap_outcome};
use sqlext::Dialect;
use sqlext::prelude::*;

#[test]
fn bulk_delete_reports_rows_affected() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = Arc::new(MockConnection::new());
    conn.reply(vec![ResultSet::affected(17)]);
    let ctx = ExtContext::new(Arc::clone(&conn));

    let delete = ctx
        .delete("sessions")
        .filter("expires_at < $1", vec![Value::Text("2024-01-01".into())]);

    rt.block_on(async {
        assert_eq!(unwrap_outcome(ctx.bulk_delete(&cx, &delete).await), 17);
    });

    let executed = conn.executed();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].sql(), "DELETE FROM \"sessions\" WHERE expires_at < $1");
    assert_eq!(conn.opens_and_closes(), (1, 1));
}

#[test]
fn bulk_update_uses_executor_dialect() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = Arc::new(MockConnection::with_dialect(Dialect::Sqlite));
    conn.reply(vec![ResultSet::affected(3)]);
    let ctx = ExtContext::with_config(Arc::clone(&conn), ExtConfig::new().log_sql(true));

    let big_spenders = Statement::new(
        "SELECT user_id AS id FROM orders GROUP BY user_id HAVING SUM(total) > ?1",
    )
    .bind(1000_i64);
    let update = ctx
        .update("users")
        .set("tier", "gold")
        .set_expr("updated", "CURRENT_TIMESTAMP")
        .matching(big_spenders, &["id"]);

    rt.block_on(async {
        assert_eq!(unwrap_outcome(ctx.bulk_update(&cx, &update).await), 3);
    });

    let executed = conn.executed();
    assert_eq!(
        executed[0].sql(),
        "UPDATE \"users\" SET \"tier\" = ?1, \"updated\" = CURRENT_TIMESTAMP WHERE \"id\" IN \
         (SELECT \"id\" FROM (SELECT user_id AS id FROM orders GROUP BY user_id HAVING SUM(total) > ?2) AS src)"
    );
    assert_eq!(executed[0].params(), &[Value::Text("gold".into()), Value::BigInt(1000)]);
}

#[test]
fn unfiltered_delete_is_refused_before_reaching_the_store() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = Arc::new(MockConnection::new());
    let ctx = ExtContext::new(Arc::clone(&conn));

    rt.block_on(async {
        let outcome = ctx.bulk_delete(&cx, &ctx.delete("users")).await;
        match outcome {
            Outcome::Err(Error::Custom(message)) => assert!(message.contains("all_rows")),
            other => panic!("expected refusal, got {other:?}"),
        }
    });

    assert_eq!(conn.round_trips(), 0);
    assert_eq!(conn.opens_and_closes(), (0, 0));
}

#[test]
fn explicit_all_rows_delete_runs() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = Arc::new(MockConnection::opened());
    conn.reply(vec![ResultSet::affected(250)]);

    let delete = BulkDelete::new("audit.events").all_rows();
    rt.block_on(async {
        assert_eq!(unwrap_outcome(delete.execute(&cx, conn.as_ref()).await), 250);
    });

    assert_eq!(conn.executed()[0].sql(), "DELETE FROM \"audit\".\"events\"");
    assert_eq!(conn.opens_and_closes(), (0, 0));
}

#[test]
fn store_failure_is_returned() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = Arc::new(MockConnection::new());
    conn.fail("foreign key violation");

    let delete = BulkDelete::new("teams").filter("id = $1", vec![Value::BigInt(1)]);
    rt.block_on(async {
        match delete.execute(&cx, conn.as_ref()).await {
            Outcome::Err(e) => {
                assert!(e.to_string().contains("foreign key violation"));
                assert!(!e.is_retryable());
                assert!(!e.is_connection_error());
            }
            other => panic!("expected store error, got {other:?}"),
        }
    });

    assert_eq!(conn.opens_and_closes(), (1, 1));
}
