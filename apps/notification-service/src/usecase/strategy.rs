//! # 宛先解決ストラテジー
//!
//! 通知リクエストの宛先指定（[`AddressingTarget`]）を、ディレクトリで解決した
//! 具体的な宛先の列（[`Audience`]）に変換する。
//!
//! ## 設計方針
//!
//! - **閉じた列挙型**: 6 種類の宛先指定を 1 つの enum で表し、解決処理は
//!   [`RecipientResolver::resolve`] の 1 か所に集約する
//! - **見つからない宛先も結果に含める**: ディレクトリに存在しない GUID は
//!   [`Recipient::Missing`] として返し、呼び出し側が `notfound` 応答にする
//! - **全体失敗は短絡**: ディレクトリに到達できない場合は宛先を 1 件も返さない
//!
//! ## 宛先指定と本文テンプレート
//!
//! | 宛先指定 | 解決方法 | 本文テンプレート |
//! |---------|---------|----------------|
//! | User | ユーザー ID をそのまま使う | `user_body.*` |
//! | Space | スペース所属ユーザー + スペース名・組織名 | `space_body.*` |
//! | Organization | 組織所属ユーザー（ロール絞り込み可）+ 組織名 | `user_body.*` |
//! | Everyone | ユーザーディレクトリの全ユーザー | `user_body.*` |
//! | UaaScope | スコープ（グループ）所属ユーザー | `user_body.*` |
//! | Email | ディレクトリを使わない | `user_body.*` |

use std::{collections::HashMap, str::FromStr, sync::Arc};

use itertools::Itertools;
use notifyd_domain::{
    DomainError,
    directory::{Identity, OrgRole, UserGuid},
    notification::BodyKind,
};
use notifyd_infra::directory::{AccessToken, DirectoryError, OrgDirectory, UserDirectory};

/// 宛先指定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressingTarget {
    /// 1 人のユーザー
    User(UserGuid),
    /// スペースの全メンバー
    Space(String),
    /// 組織のメンバー（ロール指定時はそのロールのみ）
    Organization { guid: String, role: Option<OrgRole> },
    /// ユーザーディレクトリの全ユーザー
    Everyone,
    /// スコープを持つ全ユーザー
    UaaScope(String),
    /// メールアドレス直接指定
    Email(String),
}

impl AddressingTarget {
    pub fn user(guid: &str) -> Result<Self, DomainError> {
        Ok(Self::User(UserGuid::new(guid)?))
    }

    pub fn space(guid: &str) -> Result<Self, DomainError> {
        Ok(Self::Space(non_empty(guid, "スペース GUID")?))
    }

    /// 組織宛て
    ///
    /// `role` は `OrgManager` / `OrgAuditor` / `BillingManager` のいずれか。
    pub fn organization(guid: &str, role: Option<&str>) -> Result<Self, DomainError> {
        let role = role
            .filter(|r| !r.trim().is_empty())
            .map(|r| {
                OrgRole::from_str(r.trim()).map_err(|_| {
                    DomainError::Validation(format!(
                        "role は OrgManager, OrgAuditor, BillingManager のいずれかです: {r:?}"
                    ))
                })
            })
            .transpose()?;

        Ok(Self::Organization {
            guid: non_empty(guid, "組織 GUID")?,
            role,
        })
    }

    pub fn everyone() -> Self {
        Self::Everyone
    }

    pub fn uaa_scope(scope: &str) -> Result<Self, DomainError> {
        Ok(Self::UaaScope(non_empty(scope, "スコープ")?))
    }

    /// メールアドレス宛て
    ///
    /// `local@domain` の形をしていて空白を含まないことだけを確認する。
    /// 厳密な書式チェックは送信経路に任せる。
    pub fn email(address: &str) -> Result<Self, DomainError> {
        let address = address.trim();
        let valid = address
            .split_once('@')
            .is_some_and(|(local, domain)| {
                !local.is_empty() && !domain.is_empty() && !domain.contains('@')
            })
            && !address.chars().any(char::is_whitespace);
        if !valid {
            return Err(DomainError::Validation(format!(
                "メールアドレスの形式が不正です: {address:?}"
            )));
        }
        Ok(Self::Email(address.to_string()))
    }

    /// 使用する本文テンプレートの系統
    pub fn body_kind(&self) -> BodyKind {
        match self {
            Self::Space(_) => BodyKind::Space,
            _ => BodyKind::User,
        }
    }

    /// メールアドレス直接指定か
    ///
    /// ディレクトリ上の ID を持たないため、配信停止設定と受信記録の対象外になる。
    pub fn is_email(&self) -> bool {
        matches!(self, Self::Email(_))
    }

    /// ログ用の宛先種別名
    pub fn label(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Space(_) => "space",
            Self::Organization { .. } => "organization",
            Self::Everyone => "everyone",
            Self::UaaScope(_) => "uaa_scope",
            Self::Email(_) => "email",
        }
    }
}

fn non_empty(value: &str, label: &str) -> Result<String, DomainError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DomainError::Validation(format!("{label}は必須です")));
    }
    Ok(value.to_string())
}

/// 解決された 1 宛先
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// ディレクトリで見つかったユーザー
    User(Identity),
    /// ディレクトリに存在しないユーザー
    Missing(UserGuid),
    /// メールアドレス直接指定
    Email(String),
}

/// 解決結果
///
/// 宛先の列と、テンプレートに埋め込むスペース名・組織名。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Audience {
    pub recipients:   Vec<Recipient>,
    pub space:        Option<String>,
    pub organization: Option<String>,
}

impl Audience {
    /// ディレクトリを引かずに決まる解決結果
    ///
    /// メールアドレス直接指定のときだけ `Some` を返す。
    pub fn direct(target: &AddressingTarget) -> Option<Self> {
        match target {
            AddressingTarget::Email(address) => Some(Self {
                recipients: vec![Recipient::Email(address.clone())],
                ..Self::default()
            }),
            _ => None,
        }
    }
}

/// 宛先解決
///
/// ユーザーディレクトリと組織ディレクトリを組み合わせて [`AddressingTarget`] を解決する。
pub struct RecipientResolver {
    users: Arc<dyn UserDirectory>,
    orgs:  Arc<dyn OrgDirectory>,
}

impl RecipientResolver {
    pub fn new(users: Arc<dyn UserDirectory>, orgs: Arc<dyn OrgDirectory>) -> Self {
        Self { users, orgs }
    }

    /// 宛先指定を解決する
    ///
    /// `token` はリクエスト単位で 1 度だけ取得したアクセストークン。
    #[tracing::instrument(skip_all, level = "debug", fields(target = target.label()))]
    pub async fn resolve(
        &self,
        target: &AddressingTarget,
        token: &AccessToken,
    ) -> Result<Audience, DirectoryError> {
        let audience = match target {
            AddressingTarget::User(guid) => Audience {
                recipients: self
                    .identities_for(std::slice::from_ref(guid), token)
                    .await?,
                ..Audience::default()
            },
            AddressingTarget::Space(guid) => {
                let space = self.orgs.space(guid, token).await?;
                let organization = self
                    .orgs
                    .organization(&space.organization_guid, token)
                    .await?;
                let members = self.orgs.space_user_guids(guid, token).await?;

                Audience {
                    recipients:   self.identities_for(&members, token).await?,
                    space:        Some(space.name),
                    organization: Some(organization.name),
                }
            }
            AddressingTarget::Organization { guid, role } => {
                let organization = self.orgs.organization(guid, token).await?;
                let members = self
                    .orgs
                    .organization_user_guids(guid, *role, token)
                    .await?;

                Audience {
                    recipients: self.identities_for(&members, token).await?,
                    organization: Some(organization.name),
                    ..Audience::default()
                }
            }
            AddressingTarget::Everyone => Audience {
                recipients: self
                    .users
                    .all_users(token)
                    .await?
                    .into_iter()
                    .unique_by(|identity| identity.guid.clone())
                    .map(Recipient::User)
                    .collect(),
                ..Audience::default()
            },
            AddressingTarget::UaaScope(scope) => {
                let members = self.users.user_guids_by_scope(scope, token).await?;

                Audience {
                    recipients: self.identities_for(&members, token).await?,
                    ..Audience::default()
                }
            }
            AddressingTarget::Email(_) => Audience::direct(target).unwrap_or_default(),
        };

        tracing::debug!(
            recipients = audience.recipients.len(),
            "宛先を解決しました"
        );
        Ok(audience)
    }

    /// GUID の列をユーザーディレクトリで解決する
    ///
    /// 重複を除いた上で入力順を保ち、見つからない GUID は [`Recipient::Missing`] にする。
    async fn identities_for(
        &self,
        guids: &[UserGuid],
        token: &AccessToken,
    ) -> Result<Vec<Recipient>, DirectoryError> {
        let guids: Vec<UserGuid> = guids.iter().unique().cloned().collect();
        if guids.is_empty() {
            return Ok(Vec::new());
        }

        let mut found: HashMap<UserGuid, Identity> = self
            .users
            .users_by_ids(&guids, token)
            .await?
            .into_iter()
            .map(|identity| (identity.guid.clone(), identity))
            .collect();

        Ok(guids
            .into_iter()
            .map(|guid| match found.remove(&guid) {
                Some(identity) => Recipient::User(identity),
                None => Recipient::Missing(guid),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use notifyd_infra::mock::{MockOrgDirectory, MockUserDirectory};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn guid(value: &str) -> UserGuid {
        UserGuid::new(value).unwrap()
    }

    fn identity(value: &str, email: &str) -> Recipient {
        Recipient::User(Identity {
            guid:   guid(value),
            emails: vec![email.to_string()],
        })
    }

    fn token() -> AccessToken {
        AccessToken::new("token")
    }

    fn setup() -> (MockUserDirectory, MockOrgDirectory, RecipientResolver) {
        let users = MockUserDirectory::new();
        let orgs = MockOrgDirectory::new();
        let resolver = RecipientResolver::new(Arc::new(users.clone()), Arc::new(orgs.clone()));
        (users, orgs, resolver)
    }

    #[tokio::test]
    async fn test_ユーザー宛ては1人を解決する() {
        let (users, _orgs, resolver) = setup();
        users.add_user("user-1", &["one@example.com"]);

        let audience = resolver
            .resolve(&AddressingTarget::user("user-1").unwrap(), &token())
            .await
            .unwrap();

        assert_eq!(audience.recipients, vec![identity("user-1", "one@example.com")]);
        assert_eq!(audience.space, None);
    }

    #[tokio::test]
    async fn test_存在しないユーザーはmissingになる() {
        let (_users, _orgs, resolver) = setup();

        let audience = resolver
            .resolve(&AddressingTarget::user("ghost").unwrap(), &token())
            .await
            .unwrap();

        assert_eq!(audience.recipients, vec![Recipient::Missing(guid("ghost"))]);
    }

    #[tokio::test]
    async fn test_スペース宛てはメンバーとスペース名と組織名を解決する() {
        let (users, orgs, resolver) = setup();
        orgs.add_organization("org-1", "acme");
        orgs.add_space("space-1", "dev", "org-1", &["user-1", "ghost", "user-2"]);
        users.add_user("user-1", &["one@example.com"]);
        users.add_user("user-2", &["two@example.com"]);

        let audience = resolver
            .resolve(&AddressingTarget::space("space-1").unwrap(), &token())
            .await
            .unwrap();

        assert_eq!(
            audience,
            Audience {
                recipients:   vec![
                    identity("user-1", "one@example.com"),
                    Recipient::Missing(guid("ghost")),
                    identity("user-2", "two@example.com"),
                ],
                space:        Some("dev".to_string()),
                organization: Some("acme".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_存在しないスペースはnot_foundになる() {
        let (_users, _orgs, resolver) = setup();

        let result = resolver
            .resolve(&AddressingTarget::space("nope").unwrap(), &token())
            .await;

        assert!(matches!(result, Err(DirectoryError::NotFound { entity: "Space", .. })));
    }

    #[tokio::test]
    async fn test_組織宛てはロールで絞り込める() {
        let (users, orgs, resolver) = setup();
        orgs.add_organization("org-1", "acme");
        orgs.add_org_members("org-1", None, &["user-1", "user-2"]);
        orgs.add_org_members("org-1", Some(OrgRole::OrgManager), &["user-2"]);
        users.add_user("user-1", &["one@example.com"]);
        users.add_user("user-2", &["two@example.com"]);

        let all = resolver
            .resolve(&AddressingTarget::organization("org-1", None).unwrap(), &token())
            .await
            .unwrap();
        let managers = resolver
            .resolve(
                &AddressingTarget::organization("org-1", Some("OrgManager")).unwrap(),
                &token(),
            )
            .await
            .unwrap();

        assert_eq!(all.recipients.len(), 2);
        assert_eq!(all.organization.as_deref(), Some("acme"));
        assert_eq!(all.space, None);
        assert_eq!(managers.recipients, vec![identity("user-2", "two@example.com")]);
    }

    #[tokio::test]
    async fn test_全員宛てはディレクトリの全ユーザーを返す() {
        let (users, _orgs, resolver) = setup();
        users.add_user("user-1", &["one@example.com"]);
        users.add_user("user-2", &[]);

        let audience = resolver
            .resolve(&AddressingTarget::everyone(), &token())
            .await
            .unwrap();

        assert_eq!(audience.recipients.len(), 2);
    }

    #[tokio::test]
    async fn test_スコープ宛ては重複を除いてメンバーを解決する() {
        let (users, _orgs, resolver) = setup();
        users.add_scope("cloud_controller.admin", &["user-1", "user-1", "user-2"]);
        users.add_user("user-1", &["one@example.com"]);
        users.add_user("user-2", &["two@example.com"]);

        let audience = resolver
            .resolve(
                &AddressingTarget::uaa_scope("cloud_controller.admin").unwrap(),
                &token(),
            )
            .await
            .unwrap();

        assert_eq!(
            audience.recipients,
            vec![
                identity("user-1", "one@example.com"),
                identity("user-2", "two@example.com"),
            ]
        );
    }

    #[tokio::test]
    async fn test_メール宛てはディレクトリを呼ばない() {
        let (users, orgs, resolver) = setup();
        users.fail_with(|| DirectoryError::Unavailable("down".to_string()));
        orgs.fail_with(|| DirectoryError::Unavailable("down".to_string()));

        let audience = resolver
            .resolve(&AddressingTarget::email("a@example.com").unwrap(), &token())
            .await
            .unwrap();

        assert_eq!(
            audience.recipients,
            vec![Recipient::Email("a@example.com".to_string())]
        );
    }

    #[tokio::test]
    async fn test_ディレクトリに到達できなければ宛先を返さない() {
        let (_users, orgs, resolver) = setup();
        orgs.fail_with(|| DirectoryError::Unavailable("down".to_string()));

        let result = resolver
            .resolve(&AddressingTarget::space("space-1").unwrap(), &token())
            .await;

        assert!(matches!(result, Err(DirectoryError::Unavailable(_))));
    }

    #[rstest]
    #[case("user@example.com", true)]
    #[case(" user@example.com ", true)]
    #[case("user", false)]
    #[case("@example.com", false)]
    #[case("user@", false)]
    #[case("us er@example.com", false)]
    #[case("a@b@example.com", false)]
    fn test_メールアドレスの形式を検証する(#[case] address: &str, #[case] valid: bool) {
        assert_eq!(AddressingTarget::email(address).is_ok(), valid);
    }

    #[test]
    fn test_未知のロールはvalidationエラーになる() {
        let result = AddressingTarget::organization("org-1", Some("SpaceDeveloper"));

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_空のロールは指定なしとして扱う() {
        let target = AddressingTarget::organization("org-1", Some("")).unwrap();

        assert_eq!(
            target,
            AddressingTarget::Organization {
                guid: "org-1".to_string(),
                role: None,
            }
        );
    }

    #[test]
    fn test_スペース宛てだけがスペース用の本文を使う() {
        assert_eq!(
            AddressingTarget::space("space-1").unwrap().body_kind(),
            BodyKind::Space
        );
        assert_eq!(AddressingTarget::everyone().body_kind(), BodyKind::User);
        assert_eq!(
            AddressingTarget::organization("org-1", None).unwrap().body_kind(),
            BodyKind::User
        );
    }
}
