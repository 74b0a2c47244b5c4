use super::scratch_store;

#[tokio::test]
async fn test_ensure_album_creates_each_level_once() {
    let (_dir, store) = scratch_store().await;
    let mut conn = store.pool().acquire().await.unwrap();

    let album = store
        .ensure_album(&mut conn, "catalog/products")
        .await
        .unwrap();
    assert_eq!(album.path, "catalog/products");

    let again = store
        .ensure_album(&mut conn, "/catalog/products/")
        .await
        .unwrap();
    assert_eq!(again.id, album.id);

    let parent_id: Option<i64> =
        sqlx::query_scalar("SELECT parent_id FROM media_albums WHERE path = 'catalog/products'")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
    let root = store
        .find_album_by_path(&mut conn, "catalog")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(parent_id, Some(root.id));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM media_albums")
        .fetch_one(&mut *conn)
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn test_find_album_missing() {
    let (_dir, store) = scratch_store().await;
    let mut conn = store.pool().acquire().await.unwrap();

    let album = store.find_album_by_path(&mut conn, "nowhere").await.unwrap();
    assert!(album.is_none());
}

#[tokio::test]
async fn test_ensure_album_rejects_empty_path() {
    let (_dir, store) = scratch_store().await;
    let mut conn = store.pool().acquire().await.unwrap();

    let err = store.ensure_album(&mut conn, " / ").await.unwrap_err();
    assert!(matches!(err, crate::Error::Config { .. }));
}
