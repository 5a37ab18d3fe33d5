//! Cloud Controller v2（組織ディレクトリ）クライアント
//!
//! 一覧 API は `next_url` で次ページを返すため、`null` になるまで辿る。

use async_trait::async_trait;
use itertools::Itertools;
use notifyd_domain::directory::{OrgRole, Organization, Space, UserGuid};
use reqwest::StatusCode;
use serde::{Deserialize, de::DeserializeOwned};

use super::{AccessToken, DirectoryError, OrgDirectory, REQUEST_TIMEOUT};

/// Cloud Controller クライアント
pub struct CloudControllerDirectory {
    client:   reqwest::Client,
    base_url: String,
}

impl CloudControllerDirectory {
    pub fn new(base_url: impl Into<String>) -> Result<Self, DirectoryError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DirectoryError::Unknown(format!("HTTP クライアントの構築に失敗: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// `path` を取得する。404 は `entity` / `id` の NotFound になる
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        entity: &'static str,
        id: &str,
        token: &AccessToken,
    ) -> Result<T, DirectoryError> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(token.as_str())
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(DirectoryError::NotFound {
                entity,
                id: id.to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = format!("Cloud Controller が {status} を返しました: {body}");
            return Err(if status.is_server_error() {
                DirectoryError::Unavailable(detail)
            } else {
                DirectoryError::Unknown(detail)
            });
        }
        Ok(response.json::<T>().await?)
    }

    /// ユーザー一覧を最終ページまで取得する
    async fn collect_user_guids(
        &self,
        first_path: String,
        entity: &'static str,
        id: &str,
        token: &AccessToken,
    ) -> Result<Vec<UserGuid>, DirectoryError> {
        let mut guids = Vec::new();
        let mut next = Some(first_path);

        while let Some(path) = next {
            let page: UserPage = self.get_json(&path, entity, id, token).await?;
            guids.extend(page.resources.into_iter().map(|r| r.metadata.guid));
            next = page.next_url;
        }

        guids
            .into_iter()
            .unique()
            .map(|guid| UserGuid::new(guid).map_err(|e| DirectoryError::Unknown(e.to_string())))
            .collect()
    }
}

/// ロールに対応する一覧 API のパス末尾
fn role_segment(role: Option<OrgRole>) -> &'static str {
    match role {
        None => "users",
        Some(OrgRole::OrgManager) => "managers",
        Some(OrgRole::OrgAuditor) => "auditors",
        Some(OrgRole::BillingManager) => "billing_managers",
    }
}

#[derive(Deserialize)]
struct Metadata {
    guid: String,
}

#[derive(Deserialize)]
struct Resource<E> {
    metadata: Metadata,
    entity:   E,
}

#[derive(Deserialize)]
struct SpaceEntity {
    name:              String,
    organization_guid: String,
}

#[derive(Deserialize)]
struct OrganizationEntity {
    name: String,
}

#[derive(Deserialize)]
struct UserResource {
    metadata: Metadata,
}

#[derive(Deserialize)]
struct UserPage {
    next_url:  Option<String>,
    #[serde(default)]
    resources: Vec<UserResource>,
}

#[async_trait]
impl OrgDirectory for CloudControllerDirectory {
    #[tracing::instrument(skip_all, level = "debug", fields(space_guid = %guid))]
    async fn space(&self, guid: &str, token: &AccessToken) -> Result<Space, DirectoryError> {
        let path = format!("/v2/spaces/{}", urlencoding::encode(guid));
        let resource: Resource<SpaceEntity> = self.get_json(&path, "Space", guid, token).await?;

        Ok(Space {
            guid:              resource.metadata.guid,
            name:              resource.entity.name,
            organization_guid: resource.entity.organization_guid,
        })
    }

    #[tracing::instrument(skip_all, level = "debug", fields(org_guid = %guid))]
    async fn organization(
        &self,
        guid: &str,
        token: &AccessToken,
    ) -> Result<Organization, DirectoryError> {
        let path = format!("/v2/organizations/{}", urlencoding::encode(guid));
        let resource: Resource<OrganizationEntity> =
            self.get_json(&path, "Organization", guid, token).await?;

        Ok(Organization {
            guid: resource.metadata.guid,
            name: resource.entity.name,
        })
    }

    #[tracing::instrument(skip_all, level = "debug", fields(space_guid = %guid))]
    async fn space_user_guids(
        &self,
        guid: &str,
        token: &AccessToken,
    ) -> Result<Vec<UserGuid>, DirectoryError> {
        let path = format!("/v2/spaces/{}/users", urlencoding::encode(guid));
        self.collect_user_guids(path, "Space", guid, token).await
    }

    #[tracing::instrument(skip_all, level = "debug", fields(org_guid = %guid))]
    async fn organization_user_guids(
        &self,
        guid: &str,
        role: Option<OrgRole>,
        token: &AccessToken,
    ) -> Result<Vec<UserGuid>, DirectoryError> {
        let path = format!(
            "/v2/organizations/{}/{}",
            urlencoding::encode(guid),
            role_segment(role)
        );
        self.collect_user_guids(path, "Organization", guid, token).await
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use wiremock::{
        Mock,
        MockServer,
        ResponseTemplate,
        matchers::{method, path, query_param},
    };

    use super::*;

    fn token() -> AccessToken {
        AccessToken::new("test-token")
    }

    fn directory(server: &MockServer) -> CloudControllerDirectory {
        CloudControllerDirectory::new(server.uri()).unwrap()
    }

    fn users(guids: &[&str]) -> Vec<serde_json::Value> {
        guids
            .iter()
            .map(|g| serde_json::json!({"metadata": {"guid": g}, "entity": {}}))
            .collect()
    }

    #[tokio::test]
    async fn test_spaceは名前と所属組織を返す() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/spaces/space-001"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "metadata": {"guid": "space-001"},
                "entity": {"name": "production", "organization_guid": "org-001"}
            })))
            .mount(&server)
            .await;

        let space = directory(&server).space("space-001", &token()).await.unwrap();

        assert_eq!(
            space,
            Space {
                guid:              "space-001".to_string(),
                name:              "production".to_string(),
                organization_guid: "org-001".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_存在しない組織はnot_foundになる() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/organizations/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = directory(&server).organization("missing", &token()).await;

        assert!(matches!(
            result,
            Err(DirectoryError::NotFound { entity: "Organization", ref id }) if id == "missing"
        ));
    }

    #[tokio::test]
    async fn test_space_user_guidsはnext_urlを辿って全ページを返す() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/spaces/space-001/users"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "next_url": null,
                "resources": users(&["user-3"])
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/spaces/space-001/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "next_url": "/v2/spaces/space-001/users?page=2",
                "resources": users(&["user-1", "user-2"])
            })))
            .mount(&server)
            .await;

        let guids = directory(&server)
            .space_user_guids("space-001", &token())
            .await
            .unwrap();

        let guids: Vec<&str> = guids.iter().map(UserGuid::as_str).collect();
        assert_eq!(guids, vec!["user-1", "user-2", "user-3"]);
    }

    #[rstest]
    #[case(None, "/v2/organizations/org-001/users")]
    #[case(Some(OrgRole::OrgManager), "/v2/organizations/org-001/managers")]
    #[case(Some(OrgRole::OrgAuditor), "/v2/organizations/org-001/auditors")]
    #[case(Some(OrgRole::BillingManager), "/v2/organizations/org-001/billing_managers")]
    #[tokio::test]
    async fn test_organization_user_guidsはロールに応じた一覧を使う(
        #[case] role: Option<OrgRole>,
        #[case] expected_path: &str,
    ) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(expected_path))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "next_url": null,
                "resources": users(&["user-9"])
            })))
            .mount(&server)
            .await;

        let guids = directory(&server)
            .organization_user_guids("org-001", role, &token())
            .await
            .unwrap();

        assert_eq!(guids, vec![UserGuid::new("user-9").unwrap()]);
    }

    #[tokio::test]
    async fn test_5xxは到達不能として扱う() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/spaces/space-001"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let result = directory(&server).space("space-001", &token()).await;

        assert!(matches!(result, Err(DirectoryError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_4xxは不明なエラーとして扱う() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/spaces/space-001"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let result = directory(&server).space("space-001", &token()).await;

        assert!(matches!(result, Err(DirectoryError::Unknown(_))));
    }
}
