use anyhow::bail;
use clap::{Parser, Subcommand};
use log::info;

use realm_live::collection::{OrderedRealmCollection, RealmCollection};
use realm_live::{Link, Realm, realm_object};

realm_object!(Person =>
    name set_name: String [indexed],
    age set_age: i64,
    best_friend set_best_friend: Option<Link<Person>>,
);

#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Walk through live-collection behavior on a small data set.
    Demo,
    /// Load a larger data set and verify index lookups and live re-sorting.
    Stress {
        #[arg(long, default_value_t = 10_000)]
        rows: usize,
    },
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Demo => demo(),
        Command::Stress { rows } => stress(rows),
    }
}

fn demo() -> anyhow::Result<()> {
    let realm = Realm::new();
    realm.register::<Person>()?;

    realm.write(|| -> anyhow::Result<()> {
        for (name, age) in [("Mia", 30), ("Noah", 10), ("Olivia", 20)] {
            let person: Person = realm.create()?;
            person.set_name(name.to_string())?;
            person.set_age(age)?;
        }
        Ok(())
    })?;

    let by_age = realm.query::<Person>()?.sort("age", true)?.find_all();
    println!("{} people, youngest first:", by_age.size());
    for person in &by_age {
        println!("  {} ({})", person.name()?, person.age()?);
    }

    let youngest = by_age.first()?;
    let snapshot = youngest.detach()?;
    println!("detached snapshot of the youngest: {snapshot:?}");

    realm.write(|| by_age.delete_from_realm(0))?;
    println!(
        "after deleting index 0, the collection renumbers lazily: {} people, youngest now {}",
        by_age.size(),
        by_age.first()?.age()?
    );

    println!(
        "the deleted proxy reports is_valid = {} and the snapshot still reads {:?}",
        youngest.is_valid(),
        snapshot.get("age")
    );

    Ok(())
}

fn stress(rows: usize) -> anyhow::Result<()> {
    let realm = Realm::new();
    realm.register::<Person>()?;

    info!("inserting {rows} rows");
    realm.write(|| -> anyhow::Result<()> {
        let mut previous: Option<Person> = None;
        for i in 0..rows {
            let person: Person = realm.create()?;
            person.set_name(format!("person-{i}"))?;
            person.set_age((i % 90) as i64)?;
            if let Some(friend) = &previous {
                person.set_best_friend(Some(Link::to(friend)))?;
            }
            previous = Some(person);
        }
        Ok(())
    })?;

    info!("verifying indexed lookups");
    for i in (0..rows).step_by(97) {
        let name = format!("person-{i}");
        let Some(person) = realm.find_first_by::<Person>("name", name.as_str())? else {
            bail!("indexed lookup failed for {name}");
        };
        if person.name()? != name {
            bail!("index returned the wrong row for {name}");
        }
    }

    let all = realm.find_all::<Person>()?;
    let before = all.size();

    info!("deleting every other row through the collection view");
    realm.write(|| -> anyhow::Result<()> {
        let mut index = 0;
        while index < all.size() {
            all.delete_from_realm(index)?;
            index += 1;
        }
        Ok(())
    })?;

    let after = all.size();
    println!("deleted {} of {before} rows through the view", before - after);
    if after != before / 2 {
        bail!("expected {} rows to remain, found {after}", before / 2);
    }

    let eldest = realm
        .query::<Person>()?
        .sort("age", false)?
        .find_all()
        .first()?;
    println!("eldest remaining person is {} ({})", eldest.name()?, eldest.age()?);

    Ok(())
}
