//! Text rendering of RDAP objects, with optional one-level walks over
//! related nameservers and entities.

use rdapctl_core::{Autnum, Client, Domain, Entity, IpNetwork, Nameserver, RdapObject};

pub async fn print_object(client: &Client, object: &RdapObject, walk: bool) {
    match object {
        RdapObject::Domain(domain) => {
            print_domain(domain);
            if walk {
                walk_domain(client, domain).await;
            }
        }
        RdapObject::Nameserver(nameserver) => {
            print_nameserver(nameserver);
            if walk {
                walk_entities(client, &nameserver.common.entities).await;
            }
        }
        RdapObject::IpNetwork(network) => {
            print_ip_network(network);
            if walk {
                walk_entities(client, &network.common.entities).await;
            }
        }
        RdapObject::Autnum(autnum) => {
            print_autnum(autnum);
            if walk {
                walk_entities(client, &autnum.common.entities).await;
            }
        }
        RdapObject::Entity(entity) => {
            print_entity(entity);
            if walk {
                print_nested(entity);
            }
        }
    }
}

fn header(kind: &str, label: &str, extra: &str) {
    println!("\n=== {}: {} {}===", kind.to_uppercase(), label, extra);
}

fn print_domain(domain: &Domain) {
    header("domain", domain.ldh_name.as_deref().unwrap_or(""), "");
    println!("handle: {}", domain.common.handle.as_deref().unwrap_or(""));
    if !domain.common.status.is_empty() {
        println!("status: {:?}", domain.common.status);
    }
    if let Some(secure_dns) = &domain.secure_dns {
        println!(
            "dnssec: zoneSigned={:?} delegationSigned={:?}",
            secure_dns.zone_signed, secure_dns.delegation_signed
        );
    }
    if !domain.nameservers.is_empty() {
        println!("nameservers:");
        for nameserver in &domain.nameservers {
            println!("  - {}", nameserver.ldh_name.as_deref().unwrap_or(""));
        }
    }
    if !domain.common.entities.is_empty() {
        println!("entities:");
        for entity in &domain.common.entities {
            println!(
                "  - {} ({:?})",
                entity.common.handle.as_deref().unwrap_or(""),
                entity.roles
            );
        }
    }
}

fn print_nameserver(nameserver: &Nameserver) {
    header("nameserver", nameserver.ldh_name.as_deref().unwrap_or(""), "");
    println!(
        "handle: {}",
        nameserver.common.handle.as_deref().unwrap_or("")
    );
    if let Some(addresses) = &nameserver.ip_addresses {
        if !addresses.v4.is_empty() {
            println!("v4: {:?}", addresses.v4);
        }
        if !addresses.v6.is_empty() {
            println!("v6: {:?}", addresses.v6);
        }
    }
    if !nameserver.common.entities.is_empty() {
        println!("entities:");
        for entity in &nameserver.common.entities {
            println!(
                "  - {} ({:?})",
                entity.common.handle.as_deref().unwrap_or(""),
                entity.roles
            );
        }
    }
}

fn print_ip_network(network: &IpNetwork) {
    header(
        "ip network",
        network.common.handle.as_deref().unwrap_or(""),
        &format!(
            "({} {}-{}) ",
            network.ip_version.as_deref().unwrap_or(""),
            network.start_address.as_deref().unwrap_or(""),
            network.end_address.as_deref().unwrap_or("")
        ),
    );
    println!(
        "name: {} country: {} parent: {}",
        network.name.as_deref().unwrap_or(""),
        network.country.as_deref().unwrap_or(""),
        network.parent_handle.as_deref().unwrap_or("")
    );
}

fn print_autnum(autnum: &Autnum) {
    header(
        "autnum",
        autnum.common.handle.as_deref().unwrap_or(""),
        &format!(
            "({}-{}) ",
            autnum.start_autnum.unwrap_or(0),
            autnum.end_autnum.unwrap_or(0)
        ),
    );
    println!(
        "name: {} country: {} type: {}",
        autnum.name.as_deref().unwrap_or(""),
        autnum.country.as_deref().unwrap_or(""),
        autnum.autnum_type.as_deref().unwrap_or("")
    );
}

fn print_entity(entity: &Entity) {
    header("entity", entity.common.handle.as_deref().unwrap_or(""), "");
    if !entity.roles.is_empty() {
        println!("roles: {:?}", entity.roles);
    }
}

fn print_nested(entity: &Entity) {
    for autnum in &entity.autnums {
        println!(
            "\n> nested autnum {}...",
            autnum.common.handle.as_deref().unwrap_or("")
        );
        print_autnum(autnum);
    }
    for network in &entity.networks {
        println!(
            "\n> nested network {}...",
            network.common.handle.as_deref().unwrap_or("")
        );
        print_ip_network(network);
    }
}

async fn walk_domain(client: &Client, domain: &Domain) {
    for nameserver in &domain.nameservers {
        let Some(name) = nameserver.ldh_name.as_deref() else {
            continue;
        };
        println!("\n> resolving nameserver {name}...");
        match client.nameserver(name).await {
            Ok(full) => print_nameserver(&full),
            Err(err) => println!("  (error: {err})"),
        }
    }
    walk_entities(client, &domain.common.entities).await;
}

async fn walk_entities(client: &Client, entities: &[Entity]) {
    for entity in entities {
        let Some(handle) = entity.common.handle.as_deref() else {
            continue;
        };
        println!("\n> resolving entity {handle}...");
        match client.entity(handle, "").await {
            Ok(full) => {
                print_entity(&full);
                print_nested(&full);
            }
            Err(err) => println!("  (error: {err})"),
        }
    }
}
