use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

mod common;

#[tokio::test]
async fn workspace_lines_roll_up_with_vat() -> Result<()> {
    let t = common::setup().await?;
    let owner = t.register("Owner", "owner@example.com").await?;
    t.set_role(owner.id, "PROJECT_MANAGER").await?;
    let member = t.register("Member", "member@example.com").await?;
    let outsider = t.register("Outsider", "outsider@example.com").await?;

    let (_, project) = t
        .request("POST", "/api/projects", Some(&owner.token), Some(json!({ "name": "Depot", "memberIds": [member.id] })))
        .await?;
    let project_id = project["id"].as_str().unwrap().to_string();

    let (status, _) = t
        .request("POST", "/api/workspaces", Some(&outsider.token), Some(json!({ "name": "Steal", "projectId": project_id })))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, workspace) = t
        .request("POST", "/api/workspaces", Some(&member.token), Some(json!({ "name": "Materials", "projectId": project_id })))
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{}", workspace);
    assert_eq!(workspace["currency"], "EUR");
    let ws_uri = format!("/api/workspaces/{}", workspace["id"].as_str().unwrap());

    for line in [
        json!({ "description": "Concrete", "quantity": 2, "unitPrice": 10, "vatRate": 21 }),
        json!({ "description": "Nails", "quantity": 1, "unitPrice": 5.5 }),
        json!({ "description": "Washers", "quantity": 3, "unitPrice": 0.1, "vatRate": 10 }),
    ] {
        let (status, body) = t.request("POST", &format!("{}/lines", ws_uri), Some(&member.token), Some(line)).await?;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
    }

    let (status, _) = t
        .request(
            "POST",
            &format!("{}/lines", ws_uri),
            Some(&member.token),
            Some(json!({ "description": "Bad", "quantity": 1, "unitPrice": 1, "vatRate": 150 })),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, detail) = t.request("GET", &ws_uri, Some(&owner.token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["summary"], json!({ "subtotal": 25.8, "vat": 4.23, "total": 30.03 }));

    let (status, _) = t.request("GET", &ws_uri, Some(&outsider.token), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, overview) = t
        .request("GET", &format!("/api/projects/{}/budget", project_id), Some(&member.token), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(overview[0]["summary"]["total"], 30.03);

    let line_id = detail["lines"][1]["id"].as_str().unwrap().to_string();
    let (status, _) = t
        .request("DELETE", &format!("{}/lines/{}", ws_uri, line_id), Some(&outsider.token), None)
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = t
        .request("DELETE", &format!("{}/lines/{}", ws_uri, line_id), Some(&member.token), None)
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, detail) = t.request("GET", &ws_uri, Some(&member.token), None).await?;
    assert_eq!(detail["summary"]["subtotal"], 20.3);

    Ok(())
}

#[tokio::test]
async fn workspace_members_can_edit_but_viewers_cannot() -> Result<()> {
    let t = common::setup().await?;
    let admin = t.admin().await?;
    let owner = t.register("Owner", "owner@example.com").await?;
    let helper = t.register("Helper", "helper@example.com").await?;
    let viewer = t.register("Viewer", "viewer@example.com").await?;

    let (status, role) = t
        .request("POST", "/api/roles", Some(&admin.token), Some(json!({ "name": "observer", "permissions": ["VIEW_PROJECT"] })))
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{}", role);
    let (status, _) = t
        .request("PATCH", &format!("/api/users/{}/role", viewer.id), Some(&admin.token), Some(json!({ "roleId": role["id"] })))
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, workspace) = t
        .request("POST", "/api/workspaces", Some(&owner.token), Some(json!({ "name": "Personal", "currency": "usd" })))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(workspace["currency"], "USD");
    let ws_uri = format!("/api/workspaces/{}", workspace["id"].as_str().unwrap());

    let line = json!({ "description": "Paint", "quantity": 1, "unitPrice": 40 });
    let (status, _) = t.request("POST", &format!("{}/lines", ws_uri), Some(&helper.token), Some(line.clone())).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = t
        .request("POST", &format!("{}/members", ws_uri), Some(&owner.token), Some(json!({ "userId": helper.id })))
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = t.request("POST", &format!("{}/lines", ws_uri), Some(&helper.token), Some(line.clone())).await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = t.request("GET", &ws_uri, Some(&viewer.token), None).await?;
    assert_eq!(status, StatusCode::OK, "VIEW_PROJECT sees every workspace");
    let (status, _) = t.request("POST", &format!("{}/lines", ws_uri), Some(&viewer.token), Some(line)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN, "but may not edit it");

    let (_, listed) = t.request("GET", "/api/workspaces", Some(&helper.token), None).await?;
    assert_eq!(listed.as_array().map(Vec::len), Some(1));

    Ok(())
}
