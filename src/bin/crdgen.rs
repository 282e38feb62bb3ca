use kube::CustomResourceExt;
use postgres_k8s::crd::{Postgres, PostgresVersion};

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&Postgres::crd())?);
    println!("---");
    print!("{}", serde_yaml::to_string(&PostgresVersion::crd())?);
    Ok(())
}
