use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::DbBackend;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_initial_schema"
    }
}

/// Auto-increment surrogate key. SQLite only allows AUTOINCREMENT on
/// `INTEGER PRIMARY KEY`, MySQL gets a 64-bit column.
fn surrogate_key<T: IntoIden>(backend: DbBackend, column: T) -> ColumnDef {
    let mut def = ColumnDef::new(column);
    match backend {
        DbBackend::Sqlite => def.integer(),
        _ => def.big_integer(),
    };
    def.not_null().auto_increment().primary_key();
    def
}

fn reference<T: IntoIden>(column: T) -> ColumnDef {
    let mut def = ColumnDef::new(column);
    def.big_integer().not_null();
    def
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();

        // Natural keys are UNIQUE constraints so that conflicting inserts
        // surface as unique-constraint violations on every backend.
        manager
            .create_table(
                Table::create()
                    .table(Issuer::Table)
                    .if_not_exists()
                    .col(surrogate_key(backend, Issuer::IssuerId))
                    .col(ColumnDef::new(Issuer::CommonName).text().not_null())
                    .col(ColumnDef::new(Issuer::AuthorityKeyId).string_len(128).not_null())
                    .index(
                        Index::create()
                            .name("uq_issuer_authority_key_id")
                            .col(Issuer::AuthorityKeyId)
                            .unique(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Certificate::Table)
                    .if_not_exists()
                    .col(surrogate_key(backend, Certificate::CertId))
                    .col(ColumnDef::new(Certificate::Serial).string_len(255).not_null())
                    .col(reference(Certificate::IssuerId))
                    .col(ColumnDef::new(Certificate::Subject).text().not_null())
                    .col(ColumnDef::new(Certificate::NotBefore).date_time().not_null())
                    .col(ColumnDef::new(Certificate::NotAfter).date_time().not_null())
                    .index(
                        Index::create()
                            .name("uq_certificate_serial_issuer")
                            .col(Certificate::Serial)
                            .col(Certificate::IssuerId)
                            .unique(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UnexpiredCertificate::Table)
                    .if_not_exists()
                    .col(reference(UnexpiredCertificate::CertId))
                    .col(reference(UnexpiredCertificate::IssuerId))
                    .col(ColumnDef::new(UnexpiredCertificate::NotBefore).date().not_null())
                    .col(ColumnDef::new(UnexpiredCertificate::NotAfter).date().not_null())
                    .index(
                        Index::create()
                            .name("uq_unexpired_certificate_cert")
                            .col(UnexpiredCertificate::CertId)
                            .unique(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Fqdn::Table)
                    .if_not_exists()
                    .col(surrogate_key(backend, Fqdn::NameId))
                    .col(ColumnDef::new(Fqdn::Name).string_len(255).not_null())
                    .index(Index::create().name("uq_fqdn_name").col(Fqdn::Name).unique())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CertFqdn::Table)
                    .if_not_exists()
                    .col(reference(CertFqdn::CertId))
                    .col(reference(CertFqdn::NameId))
                    .index(
                        Index::create()
                            .name("uq_cert_fqdn")
                            .col(CertFqdn::CertId)
                            .col(CertFqdn::NameId)
                            .unique(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RegisteredDomain::Table)
                    .if_not_exists()
                    .col(surrogate_key(backend, RegisteredDomain::RegdomId))
                    .col(ColumnDef::new(RegisteredDomain::Etld).string_len(255).not_null())
                    .col(ColumnDef::new(RegisteredDomain::Label).string_len(255).not_null())
                    .col(ColumnDef::new(RegisteredDomain::Domain).string_len(255).not_null())
                    .index(
                        Index::create()
                            .name("uq_registereddomain_domain")
                            .col(RegisteredDomain::Domain)
                            .unique(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CertRegisteredDomain::Table)
                    .if_not_exists()
                    .col(reference(CertRegisteredDomain::CertId))
                    .col(reference(CertRegisteredDomain::RegdomId))
                    .index(
                        Index::create()
                            .name("uq_cert_registereddomain")
                            .col(CertRegisteredDomain::CertId)
                            .col(CertRegisteredDomain::RegdomId)
                            .unique(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CtLog::Table)
                    .if_not_exists()
                    .col(surrogate_key(backend, CtLog::LogId))
                    .col(ColumnDef::new(CtLog::Url).string_len(255).not_null())
                    .col(
                        ColumnDef::new(CtLog::MaxEntry)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(CtLog::LastEntryTime).date_time().null())
                    .index(Index::create().name("uq_ctlog_url").col(CtLog::Url).unique())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CtLogEntry::Table)
                    .if_not_exists()
                    .col(reference(CtLogEntry::CertId))
                    .col(reference(CtLogEntry::LogId))
                    .col(ColumnDef::new(CtLogEntry::EntryId).big_integer().not_null())
                    .col(ColumnDef::new(CtLogEntry::EntryTime).date_time().not_null())
                    .index(
                        Index::create()
                            .name("uq_ctlogentry")
                            .col(CtLogEntry::CertId)
                            .col(CtLogEntry::LogId)
                            .col(CtLogEntry::EntryId)
                            .unique(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CensysEntry::Table)
                    .if_not_exists()
                    .col(surrogate_key(backend, CensysEntry::Id))
                    .col(reference(CensysEntry::CertId))
                    .col(ColumnDef::new(CensysEntry::EntryTime).date_time().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(NetscanQueue::Table)
                    .if_not_exists()
                    .col(reference(NetscanQueue::NameId))
                    .col(ColumnDef::new(NetscanQueue::TimeAdded).date_time().not_null())
                    .index(
                        Index::create()
                            .name("uq_netscanqueue_name")
                            .col(NetscanQueue::NameId)
                            .unique(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ResolvedName::Table)
                    .if_not_exists()
                    .col(surrogate_key(backend, ResolvedName::Id))
                    .col(reference(ResolvedName::NameId))
                    .col(ColumnDef::new(ResolvedName::Time).date_time().not_null())
                    .col(ColumnDef::new(ResolvedName::Ipaddr).string_len(64).not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ResolvedPlace::Table)
                    .if_not_exists()
                    .col(surrogate_key(backend, ResolvedPlace::Id))
                    .col(reference(ResolvedPlace::NameId))
                    .col(ColumnDef::new(ResolvedPlace::Time).date_time().not_null())
                    .col(ColumnDef::new(ResolvedPlace::City).string_len(255).not_null())
                    .col(ColumnDef::new(ResolvedPlace::Country).string_len(8).not_null())
                    .col(ColumnDef::new(ResolvedPlace::Continent).string_len(64).not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FirefoxPageloadIsTls::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(FirefoxPageloadIsTls::Datestamp).date().not_null())
                    .col(ColumnDef::new(FirefoxPageloadIsTls::CountTls).big_integer().not_null())
                    .col(
                        ColumnDef::new(FirefoxPageloadIsTls::CountPageloads)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FirefoxPageloadIsTls::TimeAdded).date_time().not_null())
                    .index(
                        Index::create()
                            .name("uq_firefoxpageloadstls_datestamp")
                            .col(FirefoxPageloadIsTls::Datestamp)
                            .unique(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let tables = [
            FirefoxPageloadIsTls::Table.into_iden(),
            ResolvedPlace::Table.into_iden(),
            ResolvedName::Table.into_iden(),
            NetscanQueue::Table.into_iden(),
            CensysEntry::Table.into_iden(),
            CtLogEntry::Table.into_iden(),
            CtLog::Table.into_iden(),
            CertRegisteredDomain::Table.into_iden(),
            RegisteredDomain::Table.into_iden(),
            CertFqdn::Table.into_iden(),
            Fqdn::Table.into_iden(),
            UnexpiredCertificate::Table.into_iden(),
            Certificate::Table.into_iden(),
            Issuer::Table.into_iden(),
        ];
        for table in tables {
            manager
                .drop_table(Table::drop().table(table).if_exists().to_owned())
                .await?;
        }
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Issuer {
    Table,
    IssuerId,
    CommonName,
    AuthorityKeyId,
}

#[derive(DeriveIden)]
enum Certificate {
    Table,
    CertId,
    Serial,
    IssuerId,
    Subject,
    NotBefore,
    NotAfter,
}

#[derive(DeriveIden)]
enum UnexpiredCertificate {
    Table,
    CertId,
    IssuerId,
    NotBefore,
    NotAfter,
}

#[derive(DeriveIden)]
enum Fqdn {
    Table,
    NameId,
    Name,
}

#[derive(DeriveIden)]
enum CertFqdn {
    Table,
    CertId,
    NameId,
}

#[derive(DeriveIden)]
enum RegisteredDomain {
    #[sea_orm(iden = "registereddomain")]
    Table,
    RegdomId,
    Etld,
    Label,
    Domain,
}

#[derive(DeriveIden)]
enum CertRegisteredDomain {
    #[sea_orm(iden = "cert_registereddomain")]
    Table,
    CertId,
    RegdomId,
}

#[derive(DeriveIden)]
enum CtLog {
    #[sea_orm(iden = "ctlog")]
    Table,
    LogId,
    Url,
    MaxEntry,
    LastEntryTime,
}

#[derive(DeriveIden)]
enum CtLogEntry {
    #[sea_orm(iden = "ctlogentry")]
    Table,
    CertId,
    LogId,
    EntryId,
    EntryTime,
}

#[derive(DeriveIden)]
enum CensysEntry {
    #[sea_orm(iden = "censysentry")]
    Table,
    Id,
    CertId,
    EntryTime,
}

#[derive(DeriveIden)]
enum NetscanQueue {
    #[sea_orm(iden = "netscanqueue")]
    Table,
    NameId,
    TimeAdded,
}

#[derive(DeriveIden)]
enum ResolvedName {
    #[sea_orm(iden = "resolvedname")]
    Table,
    Id,
    NameId,
    Time,
    Ipaddr,
}

#[derive(DeriveIden)]
enum ResolvedPlace {
    #[sea_orm(iden = "resolvedplace")]
    Table,
    Id,
    NameId,
    Time,
    City,
    Country,
    Continent,
}

#[derive(DeriveIden)]
enum FirefoxPageloadIsTls {
    #[sea_orm(iden = "firefoxpageloadstls")]
    Table,
    Datestamp,
    CountTls,
    CountPageloads,
    TimeAdded,
}
