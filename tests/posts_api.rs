mod common;

use axum::http::{header, Method, StatusCode};
use serde_json::json;

use common::{drain, events_named, TestApp, PIXEL};

#[tokio::test]
async fn empty_post_is_rejected_and_nothing_is_stored() {
    let app = TestApp::new();
    let ana = app.signup("ana").await;
    let (_channel, mut rx) = app.channel(None).await;

    let response = app
        .post("/api/posts", &ana, json!({ "content": "   " }))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.message(), "Post must have content or image");

    let list = app.get("/api/posts", &ana).await;
    assert_eq!(list.body, json!([]));
    assert!(events_named(&drain(&mut rx), "newPost").is_empty());
}

#[tokio::test]
async fn connected_channels_receive_new_posts() {
    let app = TestApp::new();
    let ana = app.signup("ana").await;
    let (_watcher, mut rx) = app.channel(None).await;

    let post = app.create_post(&ana, "hello world").await;
    assert_eq!(post["content"], "hello world");
    assert_eq!(post["author"]["username"], "ana");
    assert_eq!(post["likes"], json!([]));

    let frames = drain(&mut rx);
    let new_posts = events_named(&frames, "newPost");
    assert_eq!(new_posts.len(), 1);
    assert_eq!(new_posts[0]["data"]["id"], post["id"]);

    // A channel opened afterwards gets no replay.
    let (_late, mut late_rx) = app.channel(None).await;
    assert!(drain(&mut late_rx).is_empty());
}

#[tokio::test]
async fn deleting_someone_elses_post_is_forbidden() {
    let app = TestApp::new();
    let ana = app.signup("ana").await;
    let bea = app.signup("bea").await;
    let post = app.create_post(&ana, "mine").await;
    let id = post["id"].as_str().unwrap();

    let response = app.delete(&format!("/api/posts/{}", id), &bea).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.message(), "You can only delete your own posts");

    let list = app.get("/api/posts", &ana).await;
    assert_eq!(list.body.as_array().unwrap().len(), 1);

    let (_channel, mut rx) = app.channel(None).await;
    let ok = app.delete(&format!("/api/posts/{}", id), &ana).await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.message(), "Post deleted successfully");

    let frames = drain(&mut rx);
    let deleted = events_named(&frames, "postDeleted");
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0]["data"]["postId"], id);

    let missing = app.delete(&format!("/api/posts/{}", id), &ana).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn like_toggles_on_and_off() {
    let app = TestApp::new();
    let ana = app.signup("ana").await;
    let bea = app.signup("bea").await;
    let post = app.create_post(&ana, "like me").await;
    let uri = format!("/api/posts/{}/like", post["id"].as_str().unwrap());
    let (_channel, mut rx) = app.channel(None).await;

    let first = app.post(&uri, &bea, json!({})).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body, json!({ "likes": 1, "isLiked": true }));

    let second = app.post(&uri, &bea, json!({})).await;
    assert_eq!(second.body, json!({ "likes": 0, "isLiked": false }));

    let frames = drain(&mut rx);
    let updates = events_named(&frames, "postUpdate");
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0]["data"]["likes"], json!([bea.id]));
    assert_eq!(updates[0]["data"]["likesCount"], 1);
    assert_eq!(updates[1]["data"]["likesCount"], 0);

    let missing = app.post("/api/posts/nope/like", &bea, json!({})).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn comments_replies_and_their_likes() {
    let app = TestApp::new();
    let ana = app.signup("ana").await;
    let bea = app.signup("bea").await;
    let post = app.create_post(&ana, "talk to me").await;
    let post_id = post["id"].as_str().unwrap().to_string();
    let (_channel, mut rx) = app.channel(None).await;

    let blank = app
        .post(
            &format!("/api/posts/{}/comment", post_id),
            &bea,
            json!({ "content": "  " }),
        )
        .await;
    assert_eq!(blank.status, StatusCode::BAD_REQUEST);
    assert_eq!(blank.message(), "Comment content is required");

    let comment = app
        .post(
            &format!("/api/posts/{}/comment", post_id),
            &bea,
            json!({ "content": "  nice  " }),
        )
        .await;
    assert_eq!(comment.status, StatusCode::CREATED);
    assert_eq!(comment.body["content"], "nice");
    let comment_id = comment.body["id"].as_str().unwrap().to_string();

    let reply = app
        .post(
            &format!("/api/posts/{}/comment/{}/reply", post_id, comment_id),
            &ana,
            json!({ "content": "thanks" }),
        )
        .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    let reply_id = reply.body["id"].as_str().unwrap().to_string();

    let comment_like = app
        .post(
            &format!("/api/posts/{}/comment/{}/like", post_id, comment_id),
            &ana,
            json!({}),
        )
        .await;
    assert_eq!(comment_like.body, json!({ "likes": 1, "isLiked": true }));

    let reply_like = app
        .post(
            &format!(
                "/api/posts/{}/comment/{}/reply/{}/like",
                post_id, comment_id, reply_id
            ),
            &bea,
            json!({}),
        )
        .await;
    assert_eq!(reply_like.body, json!({ "likes": 1, "isLiked": true }));

    let frames = drain(&mut rx);
    let names: Vec<&str> = frames
        .iter()
        .map(|f| f["event"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec!["newComment", "newReply", "commentUpdate", "replyUpdate"]
    );
    assert_eq!(frames[0]["data"]["commentsCount"], 1);
    assert_eq!(frames[1]["data"]["commentId"], comment_id.as_str());

    let list = app.get(&format!("/api/posts/user/{}", ana.id), &ana).await;
    let stored = &list.body[0]["comments"][0];
    assert_eq!(stored["likes"], json!([ana.id]));
    assert_eq!(stored["replies"][0]["content"], "thanks");
    assert_eq!(stored["replies"][0]["likes"], json!([bea.id]));

    // Reply on a comment that belongs to another post.
    let other = app.create_post(&ana, "elsewhere").await;
    let wrong = app
        .post(
            &format!(
                "/api/posts/{}/comment/{}/reply",
                other["id"].as_str().unwrap(),
                comment_id
            ),
            &ana,
            json!({ "content": "lost" }),
        )
        .await;
    assert_eq!(wrong.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sharing_creates_a_reshare_post() {
    let app = TestApp::new();
    let ana = app.signup("ana").await;
    let bea = app.signup("bea").await;
    let post = app.create_post(&ana, "original").await;
    let id = post["id"].as_str().unwrap();
    let (_channel, mut rx) = app.channel(None).await;

    let shared = app
        .post(
            &format!("/api/posts/{}/share", id),
            &bea,
            json!({ "text": "look at this" }),
        )
        .await;
    assert_eq!(shared.status, StatusCode::CREATED);
    assert_eq!(shared.body["isShared"], true);
    assert_eq!(shared.body["shareCaption"], "look at this");
    assert_eq!(shared.body["originalPost"]["id"], id);
    assert_eq!(shared.body["author"]["id"], bea.id.as_str());

    let frames = drain(&mut rx);
    assert_eq!(events_named(&frames, "newPost").len(), 1);

    let mine = app.get(&format!("/api/posts/user/{}", ana.id), &ana).await;
    assert_eq!(mine.body[0]["shares"].as_array().unwrap().len(), 1);
    assert_eq!(mine.body[0]["shares"][0]["userId"], bea.id.as_str());

    let missing = app
        .post("/api/posts/nope/share", &bea, json!({}))
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn feed_pages_newest_first_and_tolerates_bad_params() {
    let app = TestApp::new();
    let ana = app.signup("ana").await;
    for i in 0..3 {
        app.create_post(&ana, &format!("post {}", i)).await;
    }

    let first = app.get("/api/posts/feed?page=1&limit=2", &ana).await;
    let first = first.body.as_array().unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first[0]["content"], "post 2");

    let second = app.get("/api/posts/feed?page=2&limit=2", &ana).await;
    assert_eq!(second.body.as_array().unwrap().len(), 1);
    assert_eq!(second.body[0]["content"], "post 0");

    let junk = app.get("/api/posts/feed?page=abc&limit=-5", &ana).await;
    assert_eq!(junk.status, StatusCode::OK);
    assert_eq!(junk.body.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn uploaded_images_are_served_back() {
    let app = TestApp::new();
    let ana = app.signup("ana").await;

    let post = app
        .post("/api/posts", &ana, json!({ "image": PIXEL }))
        .await;
    assert_eq!(post.status, StatusCode::CREATED);
    let url = post.body["image"].as_str().unwrap().to_string();
    assert!(url.starts_with("/media/"));
    assert!(url.ends_with(".png"));

    let served = app.request(Method::GET, &url, None, None).await;
    assert_eq!(served.status, StatusCode::OK);
    assert_eq!(served.headers[header::CONTENT_TYPE], "image/png");

    // Deleting the post removes the file.
    let id = post.body["id"].as_str().unwrap();
    app.delete(&format!("/api/posts/{}", id), &ana).await;
    let gone = app.request(Method::GET, &url, None, None).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);

    let bogus = app
        .post("/api/posts", &ana, json!({ "image": "ftp://nope" }))
        .await;
    assert_eq!(bogus.status, StatusCode::BAD_REQUEST);
    assert_eq!(bogus.message(), "Invalid image");
}

#[tokio::test]
async fn deleting_a_post_never_removes_another_users_upload() {
    let app = TestApp::new();
    let ana = app.signup("ana").await;
    let bea = app.signup("bea").await;

    let original = app
        .post("/api/posts", &ana, json!({ "image": PIXEL }))
        .await;
    let url = original.body["image"].as_str().unwrap().to_string();
    let file = url.rsplit('/').next().unwrap();

    let lookalike = app
        .post(
            "/api/posts",
            &bea,
            json!({ "image": format!("https://elsewhere.example/{}", file) }),
        )
        .await;
    assert_eq!(lookalike.status, StatusCode::CREATED);
    let id = lookalike.body["id"].as_str().unwrap();
    let deleted = app.delete(&format!("/api/posts/{}", id), &bea).await;
    assert_eq!(deleted.status, StatusCode::OK);

    let served = app.request(Method::GET, &url, None, None).await;
    assert_eq!(served.status, StatusCode::OK);
}
