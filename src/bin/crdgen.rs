// Prints the CRDs to install, e.g. `cargo run --bin crdgen | kubectl apply -f -`
use kube::CustomResourceExt;

fn main() {
    print!("{}", serde_yaml::to_string(&registrar::Registry::crd()).unwrap());
    print!("{}", serde_yaml::to_string(&registrar::Card::crd()).unwrap());
}
